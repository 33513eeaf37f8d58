//! A small populated world used across integration tests.

use std::rc::Rc;

use colonia_codec::{Result, Shared, World};
use colonia_core::ObjectId;
use tracing::debug;

use crate::fixtures::{empty_world, Game, Player, Stance, Tile, TileItemContainer, Unit};

/// Handles into [`sample_world`].
#[derive(Debug)]
pub struct Sample {
    /// The game root.
    pub game: Shared<Game>,
    /// `player:1`, owner of most things.
    pub alice: Shared<Player>,
    /// `player:2`.
    pub bob: Shared<Player>,
    /// `tile:1`, claimed by alice, holding goods and two units.
    pub home: Shared<Tile>,
    /// Alice's scout; escorts itself.
    pub scout: Shared<Unit>,
    /// Bob's hidden spy; escorts the scout.
    pub spy: Shared<Unit>,
}

/// Id `prefix:n`.
pub fn id(prefix: &str, n: u64) -> ObjectId {
    ObjectId::with_prefix(prefix, n)
}

/// Two players, two tiles, a goods container and two units, with a
/// self-reference (scout escorts itself) and cross references between
/// players, tiles and units.
pub fn sample_world() -> Result<(World, Sample)> {
    let mut world = empty_world()?;

    let game = world.insert(Game::new(&id("game", 1)));
    let alice = world.insert(Player::new(&id("player", 1)));
    let bob = world.insert(Player::new(&id("player", 2)));
    {
        let mut alice = alice.borrow_mut();
        alice.name = "Alice".into();
        alice.gold = 120;
        alice.stance = Stance::War;
        alice.tension = vec![0, 35];
        alice.motto = "Forward & onward\nalways".into();
    }
    {
        let mut bob = bob.borrow_mut();
        bob.name = "Bob".into();
        bob.gold = 7;
        bob.tension = vec![12, 0];
    }

    let home = world.insert(Tile::new(&id("tile", 1)));
    let field = world.insert(Tile::new(&id("tile", 2)));
    let container = world.insert(TileItemContainer::new(&id("tileItemContainer", 1)));
    let scout = world.insert(Unit::new(&id("unit", 1)));
    let spy = world.insert(Unit::new(&id("unit", 2)));

    {
        let mut container = container.borrow_mut();
        container.tile = Rc::downgrade(&home);
        container.goods = vec![3, 0, 17];
    }
    {
        let mut unit = scout.borrow_mut();
        unit.name = "Scout".into();
        unit.owner = Rc::downgrade(&alice);
        unit.location = Rc::downgrade(&home);
        unit.escort = Rc::downgrade(&scout);
        unit.moves = 4;
        unit.experience = 250;
    }
    {
        let mut unit = spy.borrow_mut();
        unit.name = "Spy".into();
        unit.owner = Rc::downgrade(&bob);
        unit.location = Rc::downgrade(&home);
        unit.escort = Rc::downgrade(&scout);
        unit.moves = 1;
        unit.hidden = true;
    }
    {
        let mut tile = home.borrow_mut();
        tile.x = 4;
        tile.y = 2;
        tile.terrain = "hills".into();
        tile.owner = Rc::downgrade(&alice);
        tile.container = Some(container);
        tile.units = vec![scout.clone(), spy.clone()];
    }
    {
        let mut tile = field.borrow_mut();
        tile.x = 5;
        tile.y = 2;
    }
    {
        let mut game = game.borrow_mut();
        game.turn = 12;
        game.next_serial = 40;
        game.players = vec![alice.clone(), bob.clone()];
        game.tiles = vec![home.clone(), field];
    }
    world.reserve_serial(40);
    debug!(entities = world.len(), "built sample world");

    Ok((
        world,
        Sample {
            game,
            alice,
            bob,
            home,
            scout,
            spy,
        },
    ))
}

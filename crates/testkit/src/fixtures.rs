//! A miniature colony game implementing the entity boundary.
//!
//! Containment (game → players/tiles, tile → container/units) uses strong
//! handles; every other reference is a `Weak` handle written as an id.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::str::FromStr;

use colonia_codec::{
    weak_id, Entity, GraphReader, GraphWriter, Result, Shared, TypeRegistry, World,
};
use colonia_core::{ObjectId, Visible};

fn downgrade<T>(shared: Option<Shared<T>>) -> Weak<RefCell<T>> {
    shared.as_ref().map(Rc::downgrade).unwrap_or_default()
}

fn same<T: Entity>(weak: &Weak<RefCell<T>>, id: &ObjectId) -> bool {
    weak_id(weak).as_ref() == Some(id)
}

/// Diplomatic stance of a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stance {
    /// Default stance.
    #[default]
    Peace,
    /// Open hostility.
    War,
}

impl fmt::Display for Stance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stance::Peace => "peace",
            Stance::War => "war",
        })
    }
}

impl FromStr for Stance {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "peace" => Ok(Stance::Peace),
            "war" => Ok(Stance::War),
            other => Err(format!("unknown stance {other:?}")),
        }
    }
}

/// Top-level game state.
#[derive(Debug)]
pub struct Game {
    id: ObjectId,
    /// Current turn.
    pub turn: i32,
    /// Serial for new ids; only saves carry it.
    pub next_serial: i64,
    /// Players, in seat order.
    pub players: Vec<Shared<Player>>,
    /// Map tiles.
    pub tiles: Vec<Shared<Tile>>,
}

impl Game {
    /// Element and factory name.
    pub const TAG: &'static str = "game";

    /// Empty game.
    pub fn new(id: &ObjectId) -> Self {
        Self {
            id: id.clone(),
            turn: 0,
            next_serial: 0,
            players: Vec::new(),
            tiles: Vec::new(),
        }
    }
}

impl Visible for Game {}

impl Entity for Game {
    fn type_name(&self) -> &'static str {
        Self::TAG
    }

    fn id(&self) -> &ObjectId {
        &self.id
    }

    fn read_attributes(&mut self, xr: &mut GraphReader<'_>) -> Result<()> {
        self.turn = xr.get_int("turn", 0);
        self.next_serial = xr.get_long("nextId", self.next_serial);
        Ok(())
    }

    fn read_children(&mut self, xr: &mut GraphReader<'_>) -> Result<()> {
        self.players.clear();
        self.tiles.clear();
        while xr.more_tags()? {
            self.read_child(xr)?;
        }
        Ok(())
    }

    fn read_child(&mut self, xr: &mut GraphReader<'_>) -> Result<()> {
        let tag = xr.local_name().to_string();
        match tag.as_str() {
            Player::TAG => self.players.push(xr.read_entity::<Player>()?),
            Tile::TAG => self.tiles.push(xr.read_entity::<Tile>()?),
            _ => return Err(xr.parse_error(format!("unexpected child of game: {tag}"))),
        }
        Ok(())
    }

    fn write_attributes(&self, xw: &mut GraphWriter<'_>) -> Result<()> {
        xw.write_attribute("turn", self.turn)?;
        if xw.is_save() {
            xw.write_attribute("nextId", self.next_serial)?;
        }
        Ok(())
    }

    fn write_children(&self, xw: &mut GraphWriter<'_>) -> Result<()> {
        for player in &self.players {
            xw.write_entity(&*player.borrow())?;
        }
        for tile in &self.tiles {
            xw.write_entity(&*tile.borrow())?;
        }
        Ok(())
    }
}

/// A participant. Gold and tension are private to the player.
#[derive(Debug)]
pub struct Player {
    id: ObjectId,
    /// Display name.
    pub name: String,
    /// Treasury.
    pub gold: i32,
    /// Stance towards the world.
    pub stance: Stance,
    /// Tension per rival, by seat.
    pub tension: Vec<i32>,
    /// Free text shown on the player panel.
    pub motto: String,
}

impl Player {
    /// Element and factory name.
    pub const TAG: &'static str = "player";

    /// Unnamed player.
    pub fn new(id: &ObjectId) -> Self {
        Self {
            id: id.clone(),
            name: String::new(),
            gold: 0,
            stance: Stance::Peace,
            tension: Vec::new(),
            motto: String::new(),
        }
    }
}

impl Visible for Player {
    fn visible_to(&self, player: &ObjectId) -> bool {
        &self.id == player
    }
}

impl Entity for Player {
    fn type_name(&self) -> &'static str {
        Self::TAG
    }

    fn id(&self) -> &ObjectId {
        &self.id
    }

    fn read_attributes(&mut self, xr: &mut GraphReader<'_>) -> Result<()> {
        self.name = xr.get_string("name", "");
        self.gold = xr.get_int("gold", 0);
        self.stance = xr.get_enum("stance", Stance::Peace);
        Ok(())
    }

    fn read_children(&mut self, xr: &mut GraphReader<'_>) -> Result<()> {
        self.tension.clear();
        self.motto.clear();
        while xr.more_tags()? {
            self.read_child(xr)?;
        }
        Ok(())
    }

    fn read_child(&mut self, xr: &mut GraphReader<'_>) -> Result<()> {
        let tag = xr.local_name().to_string();
        match tag.as_str() {
            "tension" => {
                self.tension = xr.read_indexed(0)?;
                xr.close_tag("tension", &[])
            }
            "motto" => {
                self.motto = xr.element_text()?;
                Ok(())
            }
            // Older saves carried a per-player history; it is no longer kept.
            "history" => xr.swallow_tag("history"),
            _ => Err(xr.parse_error(format!("unexpected child of player: {tag}"))),
        }
    }

    fn write_attributes(&self, xw: &mut GraphWriter<'_>) -> Result<()> {
        xw.write_attribute("name", &self.name)?;
        xw.write_attribute("stance", self.stance)?;
        if xw.is_visible(self) {
            xw.write_attribute("gold", self.gold)?;
        }
        Ok(())
    }

    fn write_children(&self, xw: &mut GraphWriter<'_>) -> Result<()> {
        if !self.motto.is_empty() {
            xw.write_start("motto")?;
            xw.write_text(&self.motto)?;
            xw.write_end()?;
        }
        if xw.is_visible(self) && !self.tension.is_empty() {
            xw.write_array_element("tension", &self.tension)?;
        }
        Ok(())
    }
}

/// One map square.
#[derive(Debug)]
pub struct Tile {
    id: ObjectId,
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
    /// Terrain name.
    pub terrain: String,
    /// Owning player, if claimed.
    pub owner: Weak<RefCell<Player>>,
    /// Goods lying on the tile.
    pub container: Option<Shared<TileItemContainer>>,
    /// Units standing on the tile.
    pub units: Vec<Shared<Unit>>,
}

impl Tile {
    /// Element and factory name.
    pub const TAG: &'static str = "tile";

    /// Unclaimed plains at the origin.
    pub fn new(id: &ObjectId) -> Self {
        Self {
            id: id.clone(),
            x: 0,
            y: 0,
            terrain: "plains".to_string(),
            owner: Weak::new(),
            container: None,
            units: Vec::new(),
        }
    }
}

impl Visible for Tile {}

impl Entity for Tile {
    fn type_name(&self) -> &'static str {
        Self::TAG
    }

    fn id(&self) -> &ObjectId {
        &self.id
    }

    fn read_attributes(&mut self, xr: &mut GraphReader<'_>) -> Result<()> {
        self.x = xr.require("x")?;
        self.y = xr.require("y")?;
        self.terrain = xr.get_string("terrain", "plains");
        self.owner = downgrade(xr.find::<Player>("owner", false)?);
        Ok(())
    }

    fn read_children(&mut self, xr: &mut GraphReader<'_>) -> Result<()> {
        self.container = None;
        self.units.clear();
        while xr.more_tags()? {
            self.read_child(xr)?;
        }
        Ok(())
    }

    fn read_child(&mut self, xr: &mut GraphReader<'_>) -> Result<()> {
        let tag = xr.local_name().to_string();
        match tag.as_str() {
            TileItemContainer::TAG => {
                self.container = Some(xr.read_entity::<TileItemContainer>()?);
            }
            Unit::TAG => self.units.push(xr.read_entity::<Unit>()?),
            _ => return Err(xr.parse_error(format!("unexpected child of tile: {tag}"))),
        }
        Ok(())
    }

    fn write_attributes(&self, xw: &mut GraphWriter<'_>) -> Result<()> {
        xw.write_attribute("x", self.x)?;
        xw.write_attribute("y", self.y)?;
        xw.write_attribute("terrain", &self.terrain)?;
        xw.write_weak_ref("owner", &self.owner)
    }

    fn write_children(&self, xw: &mut GraphWriter<'_>) -> Result<()> {
        if let Some(container) = &self.container {
            xw.write_entity(&*container.borrow())?;
        }
        for unit in &self.units {
            let unit = unit.borrow();
            if unit.hidden && !xw.is_visible(&*unit) {
                continue;
            }
            xw.write_entity(&*unit)?;
        }
        Ok(())
    }
}

/// Goods stored on a tile, as an inline list of amounts.
#[derive(Debug)]
pub struct TileItemContainer {
    id: ObjectId,
    /// Tile holding the container.
    pub tile: Weak<RefCell<Tile>>,
    /// Amount per goods type.
    pub goods: Vec<i32>,
}

impl TileItemContainer {
    /// Element and factory name.
    pub const TAG: &'static str = "tileItemContainer";

    /// Empty container.
    pub fn new(id: &ObjectId) -> Self {
        Self {
            id: id.clone(),
            tile: Weak::new(),
            goods: Vec::new(),
        }
    }
}

impl Visible for TileItemContainer {}

impl Entity for TileItemContainer {
    fn type_name(&self) -> &'static str {
        Self::TAG
    }

    fn id(&self) -> &ObjectId {
        &self.id
    }

    fn read_attributes(&mut self, xr: &mut GraphReader<'_>) -> Result<()> {
        self.tile = downgrade(xr.find::<Tile>("tile", true)?);
        self.goods = xr.read_indexed(0)?;
        Ok(())
    }

    fn write_attributes(&self, xw: &mut GraphWriter<'_>) -> Result<()> {
        xw.write_weak_ref("tile", &self.tile)?;
        xw.write_indexed_attributes(&self.goods)
    }
}

/// A movable piece. Moves, experience and escort are private to the owner;
/// hidden units are omitted entirely for other players.
#[derive(Debug)]
pub struct Unit {
    id: ObjectId,
    /// Display name.
    pub name: String,
    /// Owning player.
    pub owner: Weak<RefCell<Player>>,
    /// Tile the unit stands on.
    pub location: Weak<RefCell<Tile>>,
    /// Unit this one escorts; may be itself.
    pub escort: Weak<RefCell<Unit>>,
    /// Remaining moves.
    pub moves: i32,
    /// Accumulated experience.
    pub experience: i64,
    /// Whether other players may see the unit at all.
    pub hidden: bool,
    /// Built by the server-side constructor; never serialized.
    pub server_side: bool,
}

impl Unit {
    /// Element and factory name.
    pub const TAG: &'static str = "unit";

    /// Fresh unit with no owner.
    pub fn new(id: &ObjectId) -> Self {
        Self {
            id: id.clone(),
            name: String::new(),
            owner: Weak::new(),
            location: Weak::new(),
            escort: Weak::new(),
            moves: 3,
            experience: 0,
            hidden: false,
            server_side: false,
        }
    }

    /// Constructor registered for server reads.
    pub fn new_server(id: &ObjectId) -> Self {
        Self {
            server_side: true,
            ..Self::new(id)
        }
    }
}

impl Visible for Unit {
    fn visible_to(&self, player: &ObjectId) -> bool {
        same(&self.owner, player)
    }
}

impl Entity for Unit {
    fn type_name(&self) -> &'static str {
        Self::TAG
    }

    fn id(&self) -> &ObjectId {
        &self.id
    }

    fn read_attributes(&mut self, xr: &mut GraphReader<'_>) -> Result<()> {
        self.name = xr.get_string("name", "");
        self.owner = downgrade(xr.find::<Player>("owner", true)?);
        self.location = downgrade(xr.find::<Tile>("location", false)?);
        self.escort = downgrade(xr.find::<Unit>("escort", false)?);
        self.moves = xr.get_int("moves", 3);
        self.experience = xr.get_long("experience", 0);
        self.hidden = xr.get_bool("hidden", false);
        Ok(())
    }

    fn write_attributes(&self, xw: &mut GraphWriter<'_>) -> Result<()> {
        xw.write_attribute("name", &self.name)?;
        xw.write_weak_ref("owner", &self.owner)?;
        xw.write_weak_ref("location", &self.location)?;
        xw.write_attribute("hidden", self.hidden)?;
        if xw.is_visible(self) {
            xw.write_attribute("moves", self.moves)?;
            xw.write_attribute("experience", self.experience)?;
            xw.write_weak_ref("escort", &self.escort)?;
        }
        Ok(())
    }
}

/// Register every fixture type with `types`.
pub fn register_types(types: &mut TypeRegistry) -> Result<()> {
    types
        .register(Game::TAG, Game::new)
        .register(Player::TAG, Player::new)
        .register(Tile::TAG, Tile::new)
        .register(TileItemContainer::TAG, TileItemContainer::new)
        .register(Unit::TAG, Unit::new);
    types.register_server(Unit::TAG, Unit::new_server)?;
    Ok(())
}

/// Shared registry holding the fixture types.
pub fn fixture_types() -> Result<Rc<TypeRegistry>> {
    let mut types = TypeRegistry::new();
    register_types(&mut types)?;
    Ok(Rc::new(types))
}

/// Empty world over the fixture types.
pub fn empty_world() -> Result<World> {
    Ok(World::new(fixture_types()?))
}

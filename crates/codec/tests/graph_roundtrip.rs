use std::rc::Rc;

use colonia_codec::{
    read_game, to_markup, write_game, CodecError, Entity, EntityHandle, GraphReader, WriterOptions,
};
use colonia_core::{ReadScope, ScopeError, WriteScope, WriteScopeKind};
use colonia_testkit::{
    empty_world, id, sample_world, scoped_paths, Game, Player, Tile, TileItemContainer, Unit,
};

fn save_markup(game: &Game) -> String {
    to_markup(game, WriteScope::save()).unwrap()
}

#[test]
fn save_roundtrip_into_fresh_world() {
    let (_world, sample) = sample_world().unwrap();
    let original = save_markup(&sample.game.borrow());

    let mut fresh = empty_world().unwrap();
    let game = GraphReader::new(original.as_bytes(), &mut fresh, ReadScope::Normal)
        .read_next::<Game>()
        .unwrap();

    assert_eq!(save_markup(&game.borrow()), original);
    assert_eq!(fresh.len(), 8);

    let game = game.borrow();
    let alice = game.players[0].borrow();
    assert_eq!(alice.name, "Alice");
    assert_eq!(alice.gold, 120);
    assert_eq!(alice.tension, vec![0, 35]);
    assert_eq!(alice.motto, "Forward & onward\nalways");

    let home = game.tiles[0].borrow();
    let scout = home.units[0].clone();
    let escort = scout.borrow().escort.upgrade().unwrap();
    assert!(Rc::ptr_eq(&escort, &scout), "self reference survives");
    let location = scout.borrow().location.upgrade().unwrap();
    assert!(Rc::ptr_eq(&location, &game.tiles[0]));
    let owner = home.owner.upgrade().unwrap();
    assert!(Rc::ptr_eq(&owner, &game.players[0]));
}

#[test]
fn rereading_same_world_reuses_instances() {
    let (_world, sample) = sample_world().unwrap();
    let markup = save_markup(&sample.game.borrow());

    let mut fresh = empty_world().unwrap();
    let first = GraphReader::new(markup.as_bytes(), &mut fresh, ReadScope::Normal)
        .read_next::<Game>()
        .unwrap();
    let second = GraphReader::new(markup.as_bytes(), &mut fresh, ReadScope::Normal)
        .read_next::<Game>()
        .unwrap();

    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(fresh.len(), 8);
    let game = second.borrow();
    assert_eq!(game.players.len(), 2, "collections are replaced, not appended");
    assert_eq!(game.tiles[0].borrow().units.len(), 2);
    let unit = fresh.get_as::<Unit>(&id("unit", 1)).unwrap();
    assert!(Rc::ptr_eq(&unit, &game.tiles[0].borrow().units[0]));
}

#[test]
fn copy_is_value_equal_and_reference_distinct() {
    let (mut world, sample) = sample_world().unwrap();
    let before = world.len();

    let copy = world.copy(&sample.home).unwrap();
    let copied = copy.root().clone();
    assert!(!Rc::ptr_eq(&copied, &sample.home));
    assert_eq!(
        to_markup(&*copied.borrow(), WriteScope::save()).unwrap(),
        to_markup(&*sample.home.borrow(), WriteScope::save()).unwrap()
    );
    assert_eq!(copy.entities().len(), 4);

    let scout_copy = copy.get(&id("unit", 1)).unwrap().downcast::<Unit>().unwrap();
    assert!(!Rc::ptr_eq(&scout_copy, &sample.scout));
    let location = scout_copy.borrow().location.upgrade().unwrap();
    assert!(Rc::ptr_eq(&location, &copied), "internal references stay inside the copy");
    let owner = scout_copy.borrow().owner.upgrade().unwrap();
    assert!(Rc::ptr_eq(&owner, &sample.alice), "outside references resolve to the world");

    copied.borrow_mut().terrain = "marsh".into();
    scout_copy.borrow_mut().moves = 0;
    assert_eq!(sample.home.borrow().terrain, "hills");
    assert_eq!(sample.scout.borrow().moves, 4);
    assert_eq!(world.len(), before);
    let registered = world.get_as::<Tile>(&id("tile", 1)).unwrap();
    assert!(Rc::ptr_eq(&registered, &sample.home));
}

#[test]
fn reader_copy_restores_scope() {
    let (mut world, sample) = sample_world().unwrap();
    let markup = "<unit id=\"unit:1\" owner=\"player:2\" name=\"Decoy\"/>";
    let mut xr = GraphReader::new(markup.as_bytes(), &mut world, ReadScope::Normal);
    let copy = xr.copy::<Unit>().unwrap();
    assert_eq!(xr.scope(), ReadScope::Normal);
    drop(xr);

    assert_eq!(copy.root().borrow().name, "Decoy");
    assert_eq!(sample.scout.borrow().name, "Scout");
    let owner = copy.root().borrow().owner.upgrade().unwrap();
    assert!(Rc::ptr_eq(&owner, &sample.bob));
}

#[test]
fn nointern_never_touches_the_world() {
    let (mut world, _sample) = sample_world().unwrap();
    let before = world.len();
    let markup = "<unit id=\"unit:30\" owner=\"player:77\"/>";
    let mut xr = GraphReader::new(markup.as_bytes(), &mut world, ReadScope::NoIntern);
    let unit = xr.read_next::<Unit>().unwrap();
    let private = xr.take_uninterned();
    drop(xr);

    assert_eq!(private.len(), 2);
    assert!(unit.borrow().owner.upgrade().is_some());
    assert_eq!(world.len(), before);
    assert!(!world.contains(&id("player", 77)));
    assert!(!world.contains(&id("unit", 30)));
}

#[test]
fn redaction_is_monotone_across_scopes() {
    let (_world, sample) = sample_world().unwrap();
    let game = sample.game.borrow();
    let alice = scoped_paths(&*game, WriteScope::client(id("player", 1))).unwrap();
    let bob = scoped_paths(&*game, WriteScope::client(id("player", 2))).unwrap();
    let server = scoped_paths(&*game, WriteScope::server()).unwrap();
    let save = scoped_paths(&*game, WriteScope::save()).unwrap();

    assert!(alice.is_subset(&server));
    assert!(bob.is_subset(&server));
    assert!(server.is_subset(&save));

    assert!(save.contains("game[game:1]@nextId"));
    assert!(!server.contains("game[game:1]@nextId"));

    let alice_gold = "game[game:1]/player[player:1]@gold";
    assert!(alice.contains(alice_gold));
    assert!(!bob.contains(alice_gold));

    let spy = "game[game:1]/tile[tile:1]/unit[unit:2]";
    assert!(bob.contains(spy));
    assert!(!alice.contains(spy), "hidden units are omitted for other players");

    let scout_moves = "game[game:1]/tile[tile:1]/unit[unit:1]@moves";
    assert!(alice.contains(scout_moves));
    assert!(!bob.contains(scout_moves));
    assert!(bob.contains("game[game:1]/tile[tile:1]/unit[unit:1]@owner"));
}

#[test]
fn legacy_identifiers_resolve_to_current_slot() {
    let (mut world, sample) = sample_world().unwrap();
    let legacy = "<tileItemContainer id=\"tileitemcontainer:1\" tile=\"tile:1\" \
                  childCount=\"2\" item-0=\"9\" item-1=\"8\"/>";
    let container = GraphReader::new(legacy.as_bytes(), &mut world, ReadScope::Normal)
        .read_next::<TileItemContainer>()
        .unwrap();
    let original = sample.home.borrow().container.clone().unwrap();
    assert!(Rc::ptr_eq(&container, &original));
    assert_eq!(original.borrow().goods, vec![9, 8]);

    for scope in [ReadScope::Server, ReadScope::Normal, ReadScope::NoIntern] {
        let mut xr = GraphReader::new(legacy.as_bytes(), &mut world, scope);
        xr.next_tag().unwrap();
        assert_eq!(xr.read_id().unwrap(), Some(id("tileItemContainer", 1)));
    }
}

#[test]
fn legacy_id_attribute_name_is_accepted() {
    let (mut world, sample) = sample_world().unwrap();
    let markup = "<unit ID=\"unit:1\" owner=\"player:1\" name=\"Veteran\"/>";
    let unit = GraphReader::new(markup.as_bytes(), &mut world, ReadScope::Normal)
        .read_next::<Unit>()
        .unwrap();
    assert!(Rc::ptr_eq(&unit, &sample.scout));
    assert_eq!(sample.scout.borrow().name, "Veteran");
}

#[test]
fn malformed_optional_attribute_falls_back() {
    let (mut world, _sample) = sample_world().unwrap();
    let markup = "<unit id=\"unit:9\" owner=\"player:1\" moves=\"notanumber\" hidden=\"perhaps\"/>";
    let unit = GraphReader::new(markup.as_bytes(), &mut world, ReadScope::Normal)
        .read_next::<Unit>()
        .unwrap();
    assert_eq!(unit.borrow().moves, 3);
    assert!(!unit.borrow().hidden);
}

#[test]
fn forward_reference_is_filled_later() {
    let mut world = empty_world().unwrap();
    let unit_markup = "<unit id=\"unit:8\" owner=\"player:99\"/>";
    let unit = GraphReader::new(unit_markup.as_bytes(), &mut world, ReadScope::Normal)
        .read_next::<Unit>()
        .unwrap();
    assert!(world.contains(&id("player", 99)));

    let player_markup = "<player id=\"player:99\" name=\"Late\"/>";
    let player = GraphReader::new(player_markup.as_bytes(), &mut world, ReadScope::Normal)
        .read_next::<Player>()
        .unwrap();
    let owner = unit.borrow().owner.upgrade().unwrap();
    assert!(Rc::ptr_eq(&owner, &player));
    assert_eq!(owner.borrow().name, "Late");
}

#[test]
fn server_scope_builds_server_variant() {
    let markup = "<unit id=\"unit:20\" owner=\"player:1\"/>";

    let mut server_world = empty_world().unwrap();
    let unit = GraphReader::new(markup.as_bytes(), &mut server_world, ReadScope::Server)
        .read_next::<Unit>()
        .unwrap();
    assert!(unit.borrow().server_side);

    let mut client_world = empty_world().unwrap();
    let unit = GraphReader::new(markup.as_bytes(), &mut client_world, ReadScope::Normal)
        .read_next::<Unit>()
        .unwrap();
    assert!(!unit.borrow().server_side);
}

#[test]
fn mistyped_identifiers_are_hard_errors() {
    let (mut world, _sample) = sample_world().unwrap();

    let content = "<unit id=\"player:1\" owner=\"player:1\"/>";
    let err = GraphReader::new(content.as_bytes(), &mut world, ReadScope::Normal)
        .read_next::<Unit>()
        .unwrap_err();
    assert!(matches!(err, CodecError::TypeMismatch { .. }), "{err:?}");

    let reference = "<unit id=\"unit:7\" owner=\"tile:1\"/>";
    let err = GraphReader::new(reference.as_bytes(), &mut world, ReadScope::Normal)
        .read_next::<Unit>()
    .unwrap_err();
    match err {
        CodecError::TypeMismatch { id: bad, found, .. } => {
            assert_eq!(bad, id("tile", 1));
            assert_eq!(found, "tile");
        }
        other => panic!("unexpected error {other:?}"),
    }

    let wrong_tag = "<player id=\"unit:1\"/>";
    let err = GraphReader::new(wrong_tag.as_bytes(), &mut world, ReadScope::Normal)
        .read_next::<Unit>()
        .unwrap_err();
    assert!(matches!(err, CodecError::TypeMismatch { .. }));

    assert!(matches!(
        world.get_as::<Unit>(&id("player", 1)),
        Err(CodecError::TypeMismatch { .. })
    ));
    assert!(matches!(
        world.get_as::<Unit>(&id("unit", 404)),
        Err(CodecError::Unresolved(_))
    ));
}

#[test]
fn unknown_types_and_missing_attributes_fail() {
    let mut world = empty_world().unwrap();

    let mut xr = GraphReader::new(
        "<dragon id=\"dragon:1\"/>".as_bytes(),
        &mut world,
        ReadScope::Normal,
    );
    xr.next_tag().unwrap();
    assert!(matches!(xr.read_any(), Err(CodecError::UnknownType { .. })));
    drop(xr);

    let err = GraphReader::new(
        "<unit owner=\"player:1\"/>".as_bytes(),
        &mut world,
        ReadScope::Normal,
    )
    .read_next::<Unit>()
    .unwrap_err();
    match err {
        CodecError::Parse(parse) => {
            assert_eq!(parse.tag.as_deref(), Some("unit"));
            assert!(parse.message.contains("id"));
        }
        other => panic!("unexpected error {other:?}"),
    }

    let err = GraphReader::new(
        "<tile id=\"tile:5\" y=\"1\"/>".as_bytes(),
        &mut world,
        ReadScope::Normal,
    )
    .read_next::<Tile>()
    .unwrap_err();
    assert!(matches!(err, CodecError::Parse(_)));

    let err = GraphReader::new("<unit id=\"unit:3\"/>".as_bytes(), &mut world, ReadScope::Normal)
        .read_next::<Unit>()
        .unwrap_err();
    assert!(matches!(err, CodecError::Parse(_)), "owner is required");

    let err = GraphReader::new(
        "<unit id=\"unit:4\" owner=\"player:1\"><cargo/></unit>".as_bytes(),
        &mut world,
        ReadScope::Normal,
    )
    .read_next::<Unit>()
    .unwrap_err();
    assert!(matches!(err, CodecError::Parse(_)), "unexpected child");
}

#[test]
fn obsolete_children_are_swallowed() {
    let mut world = empty_world().unwrap();
    let markup = "<player id=\"player:5\" name=\"Old\">\
                  <history><event turn=\"1\">founded</event></history>\
                  <motto>still here</motto></player>";
    let player = GraphReader::new(markup.as_bytes(), &mut world, ReadScope::Normal)
        .read_next::<Player>()
        .unwrap();
    assert_eq!(player.borrow().motto, "still here");
}

#[test]
fn inconsistent_write_scopes_are_rejected() {
    let err: CodecError = WriteScope::new(WriteScopeKind::Client, None).unwrap_err().into();
    assert!(matches!(err, CodecError::Scope(ScopeError::MissingPlayer)));
    assert!(WriteScope::new(WriteScopeKind::Server, Some(id("player", 1))).is_err());
    assert!(WriteScope::new(WriteScopeKind::Save, Some(id("player", 1))).is_err());
    assert!(WriteScope::new(WriteScopeKind::Client, Some(id("player", 1))).is_ok());
}

#[test]
fn dispose_releases_registry_slot() {
    let (mut world, sample) = sample_world().unwrap();
    let spy = id("unit", 2);
    assert!(world.dispose(&spy).is_some());
    assert!(world.get(&spy).is_none());
    assert!(!world.contains(&spy));
    sample.home.borrow_mut().units.retain(|unit| unit.borrow().id() != &spy);
    assert_eq!(world.next_id("unit"), id("unit", 40));
}

#[test]
fn save_file_roundtrip() {
    let (_world, sample) = sample_world().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("turn12.sav");
    let roots = vec![EntityHandle::from_shared(sample.game.clone())];
    write_game(
        std::fs::File::create(&path).unwrap(),
        &roots,
        WriterOptions { pretty: true },
    )
    .unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("<savedGame version=\"2\">\n"));

    let mut fresh = empty_world().unwrap();
    let loaded =
        read_game(std::fs::File::open(&path).unwrap(), &mut fresh, ReadScope::Normal).unwrap();
    assert_eq!(loaded.version, 2);
    assert_eq!(loaded.roots.len(), 1);
    let game = loaded.roots[0].downcast::<Game>().unwrap();
    assert_eq!(save_markup(&game.borrow()), save_markup(&sample.game.borrow()));
    assert_eq!(game.borrow().next_serial, 40);

    let mut other = empty_world().unwrap();
    assert!(matches!(
        read_game(text.as_bytes(), &mut other, ReadScope::NoIntern),
        Err(CodecError::Unsupported(_))
    ));
    let future = "<savedGame version=\"99\"/>";
    assert!(matches!(
        read_game(future.as_bytes(), &mut other, ReadScope::Normal),
        Err(CodecError::Unsupported(_))
    ));
}

#[test]
fn pretty_save_keeps_blank_text_content() {
    let (_world, sample) = sample_world().unwrap();
    sample.alice.borrow_mut().motto = "   ".into();
    let roots = vec![EntityHandle::from_shared(sample.game.clone())];
    let mut buffer = Vec::new();
    write_game(&mut buffer, &roots, WriterOptions { pretty: true }).unwrap();
    let text = String::from_utf8(buffer).unwrap();
    assert!(text.contains("<motto>   </motto>"), "{text}");

    let mut fresh = empty_world().unwrap();
    read_game(text.as_bytes(), &mut fresh, ReadScope::Normal).unwrap();
    let alice: colonia_codec::Shared<Player> = fresh.get_as(&id("player", 1)).unwrap();
    assert_eq!(alice.borrow().motto, "   ");
}

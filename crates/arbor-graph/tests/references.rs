//! Integration tests for reference collections and static connections.

mod common;

use std::rc::Rc;

use arbor_graph::prelude::*;
use common::*;

// ---------------------------------------------------------------------------
// RefList
// ---------------------------------------------------------------------------

#[test]
fn ref_list_resolves_through_registry() {
    let h = three_unit_world();
    let b = h.top().units.get(1).unwrap();

    h.top().marks.push(Some(&b)).unwrap();
    h.top().marks.push(None).unwrap();

    assert_eq!(h.top().marks.ids(), vec![b.core.id(), EntityId::NONE]);
    assert!(h.top().marks.get(0).is_some_and(|u| Rc::ptr_eq(&u, &b)));
    assert!(h.top().marks.get(1).is_none());
    assert!(h.top().marks.get(2).is_none());
}

#[test]
fn ref_list_does_not_own() {
    let h = three_unit_world();
    let b = h.top().units.get(1).unwrap();
    h.top().marks.push(Some(&b)).unwrap();

    h.top().marks.remove_at(0);
    assert!(!b.core.is_destroyed());
    assert!(b.live.is_alive());
}

#[test]
fn ref_list_reads_none_after_target_destroyed() {
    let h = three_unit_world();
    let b = h.top().units.get(1).unwrap();
    h.top().marks.push(Some(&b)).unwrap();

    h.top().units.remove(&b);
    assert_eq!(h.top().marks.len(), 1);
    assert!(h.top().marks.get(0).is_none());
}

#[test]
fn ref_list_rejects_unregistered_and_detached() {
    let h = three_unit_world();
    let loose = Rc::new(Unit::new("loose", 1));
    assert_eq!(h.top().marks.push(Some(&loose)), Err(GraphError::Detached));

    let b = h.top().units.get(1).unwrap();
    h.top().units.detach_at(1);
    assert_eq!(
        h.top().marks.push(Some(&b)),
        Err(GraphError::NotRegistered { id: b.core.id() })
    );
    assert!(h.top().marks.is_empty());
}

#[test]
fn ref_list_rejects_id_registered_to_another_entity() {
    let h = three_unit_world();
    let a = h.top().units.get(0).unwrap();
    // Same id, but registered with a different root.
    let other = Hierarchy::new(World::new());
    let impostor = Rc::new(Unit::new("impostor", 0));
    impostor.core.preassign(a.core.id());
    other.top().units.push(Rc::clone(&impostor));
    assert_eq!(impostor.core.id(), a.core.id());

    assert_eq!(
        h.top().marks.push(Some(&impostor)),
        Err(GraphError::IdMismatch { id: a.core.id() })
    );
}

#[test]
fn ref_list_update_emits_only_on_change() {
    let h = three_unit_world();
    let ids: Vec<EntityId> = h.top().units.to_vec().iter().map(|u| u.core.id()).collect();
    let source = RefList::<Unit>::from_ids(ids.clone());
    let (log, _sub) = record(h.top().marks.events());

    h.top().marks.update_from(&source);
    h.top().marks.update_from(&source);

    assert_eq!(log.borrow().len(), 1);
    assert_eq!(h.top().marks.ids(), ids);
    assert!(h.top().marks.to_vec().iter().all(Option::is_some));
}

// ---------------------------------------------------------------------------
// CachedRefList
// ---------------------------------------------------------------------------

#[test]
fn cached_list_builds_lazily_and_invalidates_on_mutation() {
    let h = three_unit_world();
    let units = h.top().units.to_vec();
    for u in &units {
        h.top().squad.push(Some(u)).unwrap();
    }
    assert!(!h.top().squad.is_cached());

    assert!(h.top().squad.get(0).is_some_and(|u| Rc::ptr_eq(&u, &units[0])));
    assert!(h.top().squad.is_cached());

    h.top().squad.remove_at(0);
    assert!(!h.top().squad.is_cached());
    assert!(h.top().squad.get(0).is_some_and(|u| Rc::ptr_eq(&u, &units[1])));
}

#[test]
fn destroyed_entity_drops_out_of_cache_without_rebuild() {
    let h = three_unit_world();
    let units = h.top().units.to_vec();
    for u in &units {
        h.top().squad.push(Some(u)).unwrap();
    }
    assert!(h.top().squad.get(1).is_some());
    assert_eq!(units[1].core.on_destroy().subscriber_count(), 1);

    h.top().units.remove(&units[1]);

    assert!(h.top().squad.is_cached(), "no rebuild was needed");
    assert!(h.top().squad.get(1).is_none());
    assert!(h.top().squad.get(0).is_some());
    assert!(h.top().squad.get(2).is_some());
    assert_eq!(h.top().squad.len(), 3);
}

#[test]
fn unresolvable_cached_id_leaves_empty_slot() {
    let h = three_unit_world();
    let a = h.top().units.get(0).unwrap();
    let source = CachedRefList::<Unit>::from_ids(vec![EntityId(999), a.core.id()]);

    h.top().squad.update_from(&source);

    assert!(h.top().squad.get(0).is_none());
    assert!(h.top().squad.get(1).is_some_and(|u| Rc::ptr_eq(&u, &a)));
}

#[test]
fn cached_list_releases_watches_on_invalidate() {
    let h = three_unit_world();
    let a = h.top().units.get(0).unwrap();
    h.top().squad.push(Some(&a)).unwrap();
    h.top().squad.get(0);
    assert_eq!(a.core.on_destroy().subscriber_count(), 1);

    h.top().squad.clear();
    assert_eq!(a.core.on_destroy().subscriber_count(), 0);
}

// ---------------------------------------------------------------------------
// Static connections
// ---------------------------------------------------------------------------

#[test]
fn destroying_owner_reverses_connection_exactly_once() {
    let h = Hierarchy::new(World::new());
    let target = Rc::new(Unit::new("target", 10));
    target.core.preassign(EntityId(20));
    h.top().units.push(Rc::clone(&target));

    let curse = Rc::new(Effect::curse(3));
    curse.core().preassign(EntityId(10));
    h.top().effects.push(Rc::clone(&curse));
    apply_effect(&curse, &target).unwrap();
    assert_eq!(*target.modifiers.borrow(), vec![EntityId(10)]);

    h.top().effects.remove_at(0);
    destroy(&*curse);

    assert_eq!(*target.reversals.borrow(), vec![EntityId(10)]);
    assert!(target.modifiers.borrow().is_empty());
}

#[test]
fn connection_to_missing_target_does_not_block_others() {
    let h = three_unit_world();
    let a = h.top().units.get(0).unwrap();
    let c = h.top().units.get(2).unwrap();
    let buff = Rc::new(Effect::buff(2));
    h.top().effects.push(Rc::clone(&buff));
    apply_effect(&buff, &a).unwrap();
    apply_effect(&buff, &c).unwrap();

    // `a` disappears first; its reversal is skipped with a warning.
    h.top().units.remove(&a);
    h.top().effects.remove(&buff);

    assert_eq!(*c.reversals.borrow(), vec![buff.core().id()]);
}

#[test]
fn null_connection_is_rejected() {
    let h = Hierarchy::new(World::new());
    let buff = h.top().effects.push_new(Effect::buff(1));
    assert!(matches!(
        buff.core().connect(EntityId::NONE),
        Err(GraphError::NullConnection { .. })
    ));
}

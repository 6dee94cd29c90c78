//! Shared test model: a small game-like hierarchy exercising every container
//! kind.
//!
//! ```text
//! World
//! ├── units:   OwnedList<Unit>      (each Unit owns gear: OwnedList<Item>)
//! ├── leader:  Slot<Unit>
//! ├── bench:   Slot<Unit>
//! ├── squad:   CachedRefList<Unit>
//! ├── marks:   RefList<Unit>
//! └── effects: OwnedList<Effect>    (polymorphic: Buff | Curse)
//! ```

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use arbor_graph::prelude::*;

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

pub struct Item {
    pub core: EntityCore,
    pub label: RefCell<String>,
}

impl Item {
    pub fn new(label: &str) -> Self {
        Self {
            core: EntityCore::new(),
            label: RefCell::new(label.to_owned()),
        }
    }
}

impl Node for Item {
    fn core(&self) -> &EntityCore {
        &self.core
    }
}

impl Canonical for Item {
    fn write(&self, w: &mut Writer) {
        self.core.write(w);
        w.write_str(&self.label.borrow());
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            core: EntityCore::read(r)?,
            label: RefCell::new(r.read_string()?),
        })
    }

    fn fold_hash(&self, h: &mut StateHasher) {
        self.core.fold_hash(h);
        self.label.borrow().fold_hash(h);
    }

    fn compare(&self, other: &Self, cx: &mut CompareCx<'_>) {
        cx.scope("core", |cx| self.core.compare(&other.core, cx));
        cx.check("label", &*self.label.borrow(), &*other.label.borrow());
    }
}

impl Reconcile for Item {
    fn update_from(&self, source: &Self) {
        self.core.update_from(&source.core);
        self.label.replace(source.label.borrow().clone());
    }

    fn blank_like(_source: &Self) -> Self {
        Item::new("")
    }
}

// ---------------------------------------------------------------------------
// Unit
// ---------------------------------------------------------------------------

pub struct Unit {
    pub core: EntityCore,
    pub live: Liveness,
    pub name: RefCell<String>,
    pub hp: Cell<i32>,
    /// Ids of effects currently applied to this unit.
    pub modifiers: RefCell<Vec<EntityId>>,
    pub gear: OwnedList<Item>,
    /// Stream this unit listens to while live.
    pub watch: RefCell<Option<EventStream<i32>>>,
    pub heard: Rc<Cell<i32>>,
    /// Owners whose connections were reversed on this unit, in order.
    pub reversals: RefCell<Vec<EntityId>>,
}

impl Unit {
    pub fn new(name: &str, hp: i32) -> Self {
        Self {
            core: EntityCore::new(),
            live: Liveness::new(),
            name: RefCell::new(name.to_owned()),
            hp: Cell::new(hp),
            modifiers: RefCell::new(Vec::new()),
            gear: OwnedList::new(),
            watch: RefCell::new(None),
            heard: Rc::new(Cell::new(0)),
            reversals: RefCell::new(Vec::new()),
        }
    }

    pub fn name(&self) -> String {
        self.name.borrow().clone()
    }

    pub fn listen_to(&self, stream: &EventStream<i32>) {
        *self.watch.borrow_mut() = Some(stream.clone());
    }
}

impl Node for Unit {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn liveness(&self) -> Option<&Liveness> {
        Some(&self.live)
    }

    fn visit_containers(&self, visit: &mut dyn FnMut(&dyn Container)) {
        visit(&self.gear);
    }

    fn acquire_reactions(&self, held: &mut Reactions) {
        if let Some(stream) = self.watch.borrow().as_ref() {
            let heard = Rc::clone(&self.heard);
            held.push(stream.subscribe(move |v| heard.set(heard.get() + *v)));
        }
    }

    fn connection_target(&self) -> Option<&dyn ConnectionTarget> {
        Some(self)
    }
}

impl ConnectionTarget for Unit {
    fn reverse_connection(&self, owner: EntityId) {
        self.modifiers.borrow_mut().retain(|m| *m != owner);
        self.reversals.borrow_mut().push(owner);
    }
}

impl Canonical for Unit {
    fn write(&self, w: &mut Writer) {
        self.core.write(w);
        w.write_str(&self.name.borrow());
        w.write_i32(self.hp.get());
        self.modifiers.borrow().write(w);
        self.gear.write(w);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        let core = EntityCore::read(r)?;
        let name = r.read_string()?;
        let hp = r.read_i32()?;
        let modifiers = Vec::<EntityId>::read(r)?;
        let gear = OwnedList::<Item>::read(r)?;
        let unit = Unit::new(&name, hp);
        Ok(Unit {
            core,
            modifiers: RefCell::new(modifiers),
            gear,
            ..unit
        })
    }

    fn fold_hash(&self, h: &mut StateHasher) {
        self.core.fold_hash(h);
        self.name.borrow().fold_hash(h);
        h.fold_signed(i64::from(self.hp.get()));
        self.modifiers.borrow().fold_hash(h);
        self.gear.fold_hash(h);
    }

    fn compare(&self, other: &Self, cx: &mut CompareCx<'_>) {
        cx.scope("core", |cx| self.core.compare(&other.core, cx));
        cx.check("name", &*self.name.borrow(), &*other.name.borrow());
        cx.check("hp", &self.hp.get(), &other.hp.get());
        cx.scope("modifiers", |cx| {
            self.modifiers.borrow().compare(&other.modifiers.borrow(), cx)
        });
        cx.scope("gear", |cx| self.gear.compare(&other.gear, cx));
    }
}

impl Reconcile for Unit {
    fn update_from(&self, source: &Self) {
        self.core.update_from(&source.core);
        self.name.replace(source.name());
        self.hp.set(source.hp.get());
        self.modifiers.replace(source.modifiers.borrow().clone());
        self.gear.update_from(&source.gear);
    }

    fn blank_like(_source: &Self) -> Self {
        Unit::new("", 0)
    }
}

// ---------------------------------------------------------------------------
// Effect (polymorphic family)
// ---------------------------------------------------------------------------

pub enum Effect {
    Buff { core: EntityCore, amount: Cell<i32> },
    Curse { core: EntityCore, turns: Cell<u32> },
}

impl Effect {
    pub fn buff(amount: i32) -> Self {
        Effect::Buff {
            core: EntityCore::new(),
            amount: Cell::new(amount),
        }
    }

    pub fn curse(turns: u32) -> Self {
        Effect::Curse {
            core: EntityCore::new(),
            turns: Cell::new(turns),
        }
    }
}

impl Node for Effect {
    fn core(&self) -> &EntityCore {
        match self {
            Effect::Buff { core, .. } | Effect::Curse { core, .. } => core,
        }
    }
}

impl Polymorphic for Effect {
    const FAMILY: &'static str = "effect";

    fn type_tag(&self) -> u16 {
        match self {
            Effect::Buff { .. } => 1,
            Effect::Curse { .. } => 2,
        }
    }

    fn write_body(&self, w: &mut Writer) {
        self.core().write(w);
        match self {
            Effect::Buff { amount, .. } => w.write_i32(amount.get()),
            Effect::Curse { turns, .. } => w.write_u32(turns.get()),
        }
    }

    fn read_body(tag: u16, r: &mut Reader<'_>) -> Result<Self, CodecError> {
        match tag {
            1 => {
                let core = EntityCore::read(r)?;
                let amount = Cell::new(r.read_i32()?);
                Ok(Effect::Buff { core, amount })
            }
            2 => {
                let core = EntityCore::read(r)?;
                let turns = Cell::new(r.read_u32()?);
                Ok(Effect::Curse { core, turns })
            }
            _ => Err(CodecError::UnknownTag {
                family: Self::FAMILY,
                tag,
            }),
        }
    }
}

impl Canonical for Effect {
    fn write(&self, w: &mut Writer) {
        write_polymorphic(w, Some(self));
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        read_polymorphic_required(r)
    }

    fn fold_hash(&self, h: &mut StateHasher) {
        h.fold(u64::from(self.type_tag()));
        self.core().fold_hash(h);
        match self {
            Effect::Buff { amount, .. } => h.fold_signed(i64::from(amount.get())),
            Effect::Curse { turns, .. } => h.fold(u64::from(turns.get())),
        }
    }

    fn compare(&self, other: &Self, cx: &mut CompareCx<'_>) {
        match (self, other) {
            (Effect::Buff { amount: a, .. }, Effect::Buff { amount: b, .. }) => {
                cx.scope("core", |cx| self.core().compare(other.core(), cx));
                cx.check("amount", &a.get(), &b.get());
            }
            (Effect::Curse { turns: a, .. }, Effect::Curse { turns: b, .. }) => {
                cx.scope("core", |cx| self.core().compare(other.core(), cx));
                cx.check("turns", &a.get(), &b.get());
            }
            _ => cx.check("type_tag", &self.type_tag(), &other.type_tag()),
        }
    }
}

impl Reconcile for Effect {
    fn update_from(&self, source: &Self) {
        self.core().update_from(source.core());
        match (self, source) {
            (Effect::Buff { amount: a, .. }, Effect::Buff { amount: b, .. }) => a.set(b.get()),
            (Effect::Curse { turns: a, .. }, Effect::Curse { turns: b, .. }) => a.set(b.get()),
            _ => {}
        }
    }

    fn blank_like(source: &Self) -> Self {
        match source {
            Effect::Buff { .. } => Effect::buff(0),
            Effect::Curse { .. } => Effect::curse(0),
        }
    }

    fn same_kind(&self, other: &Self) -> bool {
        self.type_tag() == other.type_tag()
    }
}

/// Apply `effect` to `target`: record the modifier and the static connection
/// that undoes it.
pub fn apply_effect(effect: &Rc<Effect>, target: &Rc<Unit>) -> Result<(), GraphError> {
    effect.core().connect(target.core.id())?;
    target.modifiers.borrow_mut().push(effect.core().id());
    Ok(())
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

pub struct World {
    pub core: EntityCore,
    pub live: Liveness,
    pub turn: Cell<u32>,
    pub units: OwnedList<Unit>,
    pub leader: Slot<Unit>,
    pub bench: Slot<Unit>,
    pub squad: CachedRefList<Unit>,
    pub marks: RefList<Unit>,
    pub effects: OwnedList<Effect>,
}

impl World {
    pub fn new() -> Self {
        Self {
            core: EntityCore::new(),
            live: Liveness::new(),
            turn: Cell::new(0),
            units: OwnedList::new(),
            leader: Slot::empty(),
            bench: Slot::empty(),
            squad: CachedRefList::new(),
            marks: RefList::new(),
            effects: OwnedList::new(),
        }
    }

    pub fn unit_names(&self) -> Vec<String> {
        self.units.to_vec().iter().map(|u| u.name()).collect()
    }
}

impl Node for World {
    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn liveness(&self) -> Option<&Liveness> {
        Some(&self.live)
    }

    fn visit_containers(&self, visit: &mut dyn FnMut(&dyn Container)) {
        visit(&self.units);
        visit(&self.leader);
        visit(&self.bench);
        visit(&self.squad);
        visit(&self.marks);
        visit(&self.effects);
    }
}

impl Canonical for World {
    fn write(&self, w: &mut Writer) {
        self.core.write(w);
        w.write_u32(self.turn.get());
        self.units.write(w);
        self.leader.write(w);
        self.bench.write(w);
        self.squad.write(w);
        self.marks.write(w);
        self.effects.write(w);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            core: EntityCore::read(r)?,
            live: Liveness::new(),
            turn: Cell::new(r.read_u32()?),
            units: OwnedList::read(r)?,
            leader: Slot::read(r)?,
            bench: Slot::read(r)?,
            squad: CachedRefList::read(r)?,
            marks: RefList::read(r)?,
            effects: OwnedList::read(r)?,
        })
    }

    fn fold_hash(&self, h: &mut StateHasher) {
        self.core.fold_hash(h);
        h.fold(u64::from(self.turn.get()));
        self.units.fold_hash(h);
        self.leader.fold_hash(h);
        self.bench.fold_hash(h);
        self.squad.fold_hash(h);
        self.marks.fold_hash(h);
        self.effects.fold_hash(h);
    }

    fn compare(&self, other: &Self, cx: &mut CompareCx<'_>) {
        cx.scope("core", |cx| self.core.compare(&other.core, cx));
        cx.check("turn", &self.turn.get(), &other.turn.get());
        cx.scope("units", |cx| self.units.compare(&other.units, cx));
        cx.scope("leader", |cx| self.leader.compare(&other.leader, cx));
        cx.scope("bench", |cx| self.bench.compare(&other.bench, cx));
        cx.scope("squad", |cx| self.squad.compare(&other.squad, cx));
        cx.scope("marks", |cx| self.marks.compare(&other.marks, cx));
        cx.scope("effects", |cx| self.effects.compare(&other.effects, cx));
    }
}

impl Reconcile for World {
    fn update_from(&self, source: &Self) {
        self.core.update_from(&source.core);
        self.turn.set(source.turn.get());
        self.units.update_from(&source.units);
        self.leader.update_from(&source.leader);
        self.bench.update_from(&source.bench);
        self.squad.update_from(&source.squad);
        self.marks.update_from(&source.marks);
        self.effects.update_from(&source.effects);
    }

    fn blank_like(_source: &Self) -> Self {
        World::new()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A live hierarchy holding three units named `a`, `b`, `c`.
pub fn three_unit_world() -> Hierarchy<World> {
    let h = Hierarchy::new(World::new());
    for (name, hp) in [("a", 10), ("b", 20), ("c", 30)] {
        h.top().units.push_new(Unit::new(name, hp));
    }
    h
}

/// Collect every event emitted by `stream` into a shared log.
pub fn record<E: Clone + 'static>(stream: &EventStream<E>) -> (Rc<RefCell<Vec<E>>>, Subscription) {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    let sub = stream.subscribe(move |e: &E| sink.borrow_mut().push(e.clone()));
    (log, sub)
}

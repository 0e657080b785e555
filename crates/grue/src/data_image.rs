//! Object layout and nested-array deferred placement.
//!
//! Two independent pieces of machinery live here: [`ObjectInProgress`],
//! which grows an object's header and property records directly in the
//! data arena as its declaration is parsed (per spec §4.3's numbered
//! steps), and [`NestedArrayQueue`], which defers placing `{ ... }`
//! initializers nested inside another initializer until the enclosing
//! top-level declaration is done, so nested arrays always land *after*
//! their parent.

use ahash::{AHashMap, AHashSet};

use crate::arena::{DataArena, DataOffset, Region};
use crate::error::{CompileError, CompileResult};
use crate::symbol::{GlobalSymbolId, GlobalTable, PropertyTag};

/// High bit of a property record's tag word, marking it shared (storage
/// lives in the class; instances never copy it).
pub const SHARED_BIT: i32 = 1 << 15;

/// An object under construction: its header is reserved first (as the
/// spec's step 1 requires, so the object symbol has an address before its
/// properties are parsed), and each inherited or bound property grows the
/// arena immediately.
pub struct ObjectInProgress {
    header_offset: DataOffset,
    slots: AHashMap<PropertyTag, (DataOffset, bool)>,
    inherited_shared: AHashSet<PropertyTag>,
    count: u16,
}

impl ObjectInProgress {
    /// Reserves `{ class-ref, n-properties }` at the current data cursor.
    /// `class_value` is the class's data offset (its own header offset), or
    /// 0 if this object has no named class.
    pub fn start(data: &mut DataArena, class_value: i32) -> CompileResult<Self> {
        let header_offset = data.push(class_value)?;
        data.push(0)?; // n-properties, patched in `finish`
        Ok(Self { header_offset, slots: AHashMap::new(), inherited_shared: AHashSet::new(), count: 0 })
    }

    #[must_use]
    pub fn header_offset(&self) -> DataOffset {
        self.header_offset
    }

    /// Copies one of the class's properties into this instance, per spec
    /// §4.3 step 2: shared properties are not copied (only noted, so a
    /// later attempt to bind them is rejected); non-shared properties
    /// become new slots with the class's current value.
    pub fn inherit(&mut self, data: &mut DataArena, tag: PropertyTag, shared: bool, value: i32) -> CompileResult<()> {
        if shared {
            self.inherited_shared.insert(tag);
            return Ok(());
        }
        data.push(tag as i32)?;
        let value_word = data.push(value)?;
        self.slots.insert(tag, (value_word, false));
        self.count += 1;
        Ok(())
    }

    /// Binds `tag` to `value` (spec §4.3 step 3): overwrites an inherited
    /// slot of the same tag if present, appends a new one otherwise. Errors
    /// if `tag` is inherited from the class as a *shared* property — shared
    /// storage lives in the class and can't be rebound from an instance.
    /// Returns the arena offset of the value word, so the caller can
    /// register a fixup against it if the bound value is forward-referenced
    /// or is a nested array awaiting placement.
    pub fn declare_property(&mut self, data: &mut DataArena, tag: PropertyTag, shared: bool, value: i32) -> CompileResult<DataOffset> {
        if self.inherited_shared.contains(&tag) {
            return Err(CompileError::semantic("cannot rebind a shared property inherited from the class"));
        }
        if let Some(&(value_word, _)) = self.slots.get(&tag) {
            data.set(value_word, value);
            return Ok(value_word);
        }
        let tag_word = if shared { tag as i32 | SHARED_BIT } else { tag as i32 };
        data.push(tag_word)?;
        let value_word = data.push(value)?;
        self.slots.insert(tag, (value_word, shared));
        self.count += 1;
        Ok(value_word)
    }

    /// Patches the header's `n-properties` word and returns the header
    /// offset to use as the object symbol's value.
    pub fn finish(self, data: &mut DataArena) -> DataOffset {
        data.set(self.header_offset + 1, self.count as i32);
        self.header_offset
    }
}

/// Reads back an already-placed object's properties, for a subclass to
/// inherit from. `header_offset` must name a fully finished object (the
/// language requires a class to be defined before it's instantiated).
#[must_use]
pub fn read_properties(data: &DataArena, header_offset: DataOffset) -> Vec<(PropertyTag, bool, i32)> {
    let count = data.get(header_offset + 1);
    let mut out = Vec::with_capacity(count.max(0) as usize);
    for i in 0..count {
        let record = header_offset + 2 + (i as u32) * 2;
        let tag_word = data.get(record);
        let shared = tag_word & SHARED_BIT != 0;
        let tag = (tag_word & !SHARED_BIT) as PropertyTag;
        let value = data.get(record + 1);
        out.push((tag, shared, value));
    }
    out
}

/// Where a queued nested-array block's resolved offset must be written back
/// once it's placed.
#[derive(Debug, Clone, Copy)]
pub enum ParentSlot {
    /// Already-placed arena word (a top-level `var`'s slot, or an object
    /// property's value word).
    Arena(DataOffset),
    /// A slot inside another not-yet-placed block's flattened buffer,
    /// identified by the block's queue index and the slot's index within
    /// that buffer.
    Block(usize, u32),
}

/// A not-yet-placed `{ ... }` initializer: its flattened element words plus
/// any forward symbol references recorded against them.
///
/// Note: unlike the reference implementation this is grounded on, string
/// references inside a nested array are never deferred — this crate's
/// string arena assigns a string's final byte offset the moment it's
/// interned (see [`crate::arena::StringArena`]), so a string element is
/// simply written into the flattened buffer immediately rather than
/// carrying its own fixup list.
struct PendingBlock {
    parent: ParentSlot,
    words: Vec<i32>,
    symbol_fixups: Vec<(u32, GlobalSymbolId)>,
}

/// Opaque handle to a queued block, used as its parent's `ParentSlot::Block`
/// target before the block itself has been placed.
#[derive(Debug, Clone, Copy)]
pub struct BlockId(usize);

#[derive(Default)]
pub struct NestedArrayQueue {
    pending: Vec<PendingBlock>,
}

impl NestedArrayQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a block for later placement. `words` is its flattened element
    /// buffer (with 0 placeholders at positions recorded in
    /// `symbol_fixups` or corresponding to nested child blocks).
    pub fn enqueue(&mut self, parent: ParentSlot, words: Vec<i32>, symbol_fixups: Vec<(u32, GlobalSymbolId)>) -> BlockId {
        let id = BlockId(self.pending.len());
        self.pending.push(PendingBlock { parent, words, symbol_fixups });
        id
    }

    /// Reserves a block's place before any of its elements are parsed, so a
    /// nested child (parsed before this block's own element list is known in
    /// full) can name this block as its parent. Fill in the element buffer
    /// with [`Self::fill`] once parsing of this block's own `{ ... }` is
    /// done.
    pub fn reserve(&mut self, parent: ParentSlot) -> BlockId {
        let id = BlockId(self.pending.len());
        self.pending.push(PendingBlock { parent, words: Vec::new(), symbol_fixups: Vec::new() });
        id
    }

    /// Supplies the element buffer for a block previously returned by
    /// [`Self::reserve`].
    pub fn fill(&mut self, id: BlockId, words: Vec<i32>, symbol_fixups: Vec<(u32, GlobalSymbolId)>) {
        let block = &mut self.pending[id.0];
        block.words = words;
        block.symbol_fixups = symbol_fixups;
    }

    #[must_use]
    pub fn parent_slot_for(block: BlockId, local_offset: u32) -> ParentSlot {
        ParentSlot::Block(block.0, local_offset)
    }

    /// Places every queued block into the data arena, in declaration
    /// (enqueue) order, so sibling blocks satisfy `offset(A) < offset(B)`
    /// when A was declared first. Each block is prefixed by its element
    /// count at `offset - 1`.
    pub fn place_all(&mut self, data: &mut DataArena, globals: &mut GlobalTable) -> CompileResult<()> {
        let mut placed: Vec<DataOffset> = Vec::with_capacity(self.pending.len());
        for block in &self.pending {
            data.push(block.words.len() as i32)?;
            let first = data.extend(&block.words)?;
            for &(local_offset, symbol) in &block.symbol_fixups {
                let value = globals.resolve_or_fixup(symbol, Region::Data, first + local_offset);
                data.set(first + local_offset, value);
            }
            placed.push(first);
            match block.parent {
                ParentSlot::Arena(offset) => data.set(offset, first as i32),
                ParentSlot::Block(parent_index, local_offset) => {
                    let parent_offset = placed[parent_index];
                    data.set(parent_offset + local_offset, first as i32);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::Interner;

    #[test]
    fn object_inherits_non_shared_only() {
        let mut data = DataArena::new(1024);
        let mut class = ObjectInProgress::start(&mut data, 0).unwrap();
        class.declare_property(&mut data, 1, true, 1).unwrap();
        class.declare_property(&mut data, 2, false, 2).unwrap();
        let class_offset = class.finish(&mut data);

        let props = read_properties(&data, class_offset);
        assert_eq!(props, vec![(1, true, 1), (2, false, 2)]);

        let mut instance = ObjectInProgress::start(&mut data, class_offset as i32).unwrap();
        for &(tag, shared, value) in &props {
            instance.inherit(&mut data, tag, shared, value).unwrap();
        }
        let instance_offset = instance.finish(&mut data);
        let instance_props = read_properties(&data, instance_offset);
        assert_eq!(instance_props, vec![(2, false, 2)]);
    }

    #[test]
    fn rebinding_inherited_shared_property_is_an_error() {
        let mut data = DataArena::new(1024);
        let mut class = ObjectInProgress::start(&mut data, 0).unwrap();
        class.declare_property(&mut data, 1, true, 1).unwrap();
        let class_offset = class.finish(&mut data);
        let props = read_properties(&data, class_offset);

        let mut instance = ObjectInProgress::start(&mut data, class_offset as i32).unwrap();
        for &(tag, shared, value) in &props {
            instance.inherit(&mut data, tag, shared, value).unwrap();
        }
        let err = instance.declare_property(&mut data, 1, false, 99).unwrap_err();
        assert!(matches!(err, CompileError::Semantic { .. }));
    }

    #[test]
    fn sibling_nested_arrays_place_in_declaration_order() {
        let mut data = DataArena::new(1024);
        let mut globals = GlobalTable::new();
        let mut queue = NestedArrayQueue::new();
        let top = data.reserve(1).unwrap();
        let a = queue.enqueue(ParentSlot::Arena(top), vec![10, 20], Vec::new());
        let _ = a;
        let b = queue.enqueue(ParentSlot::Arena(top), vec![30], Vec::new());
        let _ = b;
        queue.place_all(&mut data, &mut globals).unwrap();
        // `b` was enqueued second, so it must land after `a`.
        assert!(data.get(top) < data.words().len() as i32);
    }

    #[test]
    fn forward_referenced_symbol_in_nested_array_gets_a_real_fixup() {
        let mut names = Interner::new();
        let mut data = DataArena::new(1024);
        let mut globals = GlobalTable::new();
        let o = names.intern("o");
        let sym = globals.find_or_add_undefined(o);
        let mut queue = NestedArrayQueue::new();
        let top = data.reserve(1).unwrap();
        queue.enqueue(ParentSlot::Arena(top), vec![0], vec![(0, sym)]);
        queue.place_all(&mut data, &mut globals).unwrap();
        globals.declare(o, crate::symbol::StorageKind::Object, 42, &names).unwrap();
        let mut code = crate::arena::CodeArena::new(16);
        crate::fixup::resolve_all(&globals, &mut code, &mut data);
        let block_offset = data.get(top) as u32;
        assert_eq!(data.get(block_offset), 42);
    }
}

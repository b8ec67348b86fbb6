//! Thin instruction emitter over `FunctionBuilder`.
//!
//! The current block is never left terminated: after `ret` the emitter moves to a fresh block
//! with no predecessors, and callers switch blocks after every `jump`/`branch_if`.

use cranelift_codegen::cursor::{Cursor, FuncCursor};
use cranelift_codegen::ir::{
    Block, FuncRef, Function, GlobalValue, InstBuilder, MemFlags, Signature, StackSlotData,
    StackSlotKind, Type, Value,
};
use cranelift_frontend::{FuncInstBuilder, FunctionBuilder, FunctionBuilderContext};

pub struct FuncEmitter<'a> {
    builder: FunctionBuilder<'a>,
    entry: Block,
    pointer_type: Type,
}

impl<'a> FuncEmitter<'a> {
    /// Creates the entry block, binds the signature's parameters to it and positions there.
    pub fn new(
        func: &'a mut Function,
        fctx: &'a mut FunctionBuilderContext,
        pointer_type: Type,
    ) -> Self {
        let mut builder = FunctionBuilder::new(func, fctx);
        let entry = builder.create_block();
        builder.append_block_params_for_function_params(entry);
        builder.switch_to_block(entry);
        builder.ensure_inserted_block();
        FuncEmitter { builder, entry, pointer_type }
    }

    pub fn pointer_type(&self) -> Type {
        self.pointer_type
    }

    pub fn params(&self) -> Vec<Value> {
        self.builder.block_params(self.entry).to_vec()
    }

    pub fn func(&mut self) -> &mut Function {
        &mut *self.builder.func
    }

    pub fn ins(&mut self) -> FuncInstBuilder<'_, 'a> {
        self.builder.ins()
    }

    pub fn value_type(&self, value: Value) -> Type {
        self.builder.func.dfg.value_type(value)
    }

    pub fn create_block(&mut self) -> Block {
        self.builder.create_block()
    }

    pub fn create_block_with_param(&mut self, ty: Type) -> (Block, Value) {
        let block = self.builder.create_block();
        let param = self.builder.append_block_param(block, ty);
        (block, param)
    }

    /// Block laid out away from the hot path.
    pub fn create_cold_block(&mut self) -> Block {
        let block = self.builder.create_block();
        self.builder.set_cold_block(block);
        block
    }

    pub fn switch_to(&mut self, block: Block) {
        self.builder.switch_to_block(block);
    }

    /// Integer constant; `value` is truncated to the width of `ty`.
    pub fn iconst(&mut self, ty: Type, value: i64) -> Value {
        let bits = ty.bits();
        let value = if bits < 64 { value & ((1i64 << bits) - 1) } else { value };
        self.builder.ins().iconst(ty, value)
    }

    pub fn null_ptr(&mut self) -> Value {
        let ptr = self.pointer_type;
        self.iconst(ptr, 0)
    }

    /// Converts an integer to pointer width, sign-extending narrower values.
    pub fn to_pointer_width(&mut self, value: Value) -> Value {
        let ty = self.value_type(value);
        let ptr = self.pointer_type;
        if ty == ptr {
            value
        } else if ty.bits() < ptr.bits() {
            self.builder.ins().sextend(ptr, value)
        } else {
            self.builder.ins().ireduce(ptr, value)
        }
    }

    /// `base + offset` in bytes.
    pub fn offset_addr(&mut self, base: Value, offset: i64) -> Value {
        if offset == 0 {
            base
        } else {
            self.builder.ins().iadd_imm(base, offset)
        }
    }

    /// `base + index * stride + offset`, with `index` of any integer width.
    pub fn element_addr(&mut self, base: Value, index: Value, stride: u32, offset: u32) -> Value {
        let index = self.to_pointer_width(index);
        let scaled = self.builder.ins().imul_imm(index, i64::from(stride));
        let addr = self.builder.ins().iadd(base, scaled);
        self.offset_addr(addr, i64::from(offset))
    }

    pub fn load(&mut self, ty: Type, addr: Value, offset: i32) -> Value {
        self.builder.ins().load(ty, MemFlags::new(), addr, offset)
    }

    pub fn store(&mut self, value: Value, addr: Value, offset: i32) {
        self.builder.ins().store(MemFlags::new(), value, addr, offset);
    }

    /// Address of a fresh stack slot; the address is materialized at the top of the entry block.
    pub fn stack_alloc(&mut self, size: u32, align: u32) -> Value {
        let align_shift = align.max(1).next_power_of_two().trailing_zeros() as u8;
        let slot = self.builder.create_sized_stack_slot(StackSlotData::new(
            StackSlotKind::ExplicitSlot,
            size,
            align_shift,
        ));
        let ptr = self.pointer_type;
        let entry = self.entry;
        let mut cursor = FuncCursor::new(&mut *self.builder.func).at_first_insertion_point(entry);
        cursor.ins().stack_addr(ptr, slot, 0)
    }

    pub fn symbol_addr(&mut self, gv: GlobalValue) -> Value {
        let ptr = self.pointer_type;
        self.builder.ins().symbol_value(ptr, gv)
    }

    pub fn func_addr(&mut self, func_ref: FuncRef) -> Value {
        let ptr = self.pointer_type;
        self.builder.ins().func_addr(ptr, func_ref)
    }

    pub fn call(&mut self, func_ref: FuncRef, args: &[Value]) -> Option<Value> {
        let inst = self.builder.ins().call(func_ref, args);
        self.builder.inst_results(inst).first().copied()
    }

    pub fn call_indirect(&mut self, sig: Signature, callee: Value, args: &[Value]) -> Option<Value> {
        let sig_ref = self.builder.import_signature(sig);
        let inst = self.builder.ins().call_indirect(sig_ref, callee, args);
        self.builder.inst_results(inst).first().copied()
    }

    /// Terminates the current block with a two-way branch on `cond != 0`.
    pub fn branch_if(
        &mut self,
        cond: Value,
        then_block: Block,
        then_args: &[Value],
        else_block: Block,
        else_args: &[Value],
    ) {
        self.builder.ins().brif(cond, then_block, then_args, else_block, else_args);
    }

    pub fn jump(&mut self, block: Block, args: &[Value]) {
        self.builder.ins().jump(block, args);
    }

    /// Returns from the function and continues in an unreachable block.
    pub fn ret(&mut self, values: &[Value]) {
        self.builder.ins().return_(values);
        let dead = self.builder.create_block();
        self.builder.switch_to_block(dead);
    }

    /// Seals every block and finishes the function.
    pub fn finish(mut self) {
        self.builder.seal_all_blocks();
        self.builder.finalize();
    }
}

impl std::fmt::Debug for FuncEmitter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FuncEmitter")
            .field("entry", &self.entry)
            .field("pointer_type", &self.pointer_type)
            .finish()
    }
}

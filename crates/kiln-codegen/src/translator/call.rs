// Packed calls over a caller-owned stack of tagged values.

use cranelift_codegen::ir::condcodes::IntCC;
use cranelift_codegen::ir::{types, InstBuilder, Value};
use cranelift_module::Module;
use kiln_layout::{field, type_index};
use kiln_tir::{DataType, TypeCode};

use super::FunctionTranslator;
use crate::abi::{self, RuntimeFn};
use crate::Result;

/// How the callee of a packed call is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PackedCallMode {
    /// Handle looked up by name through the runtime, called via `kiln_ffi_function_call`.
    Lookup,
    /// C symbol imported by exact name, called with a null self handle.
    Direct,
}

/// Result of a packed call: the converted return value and the returned type index.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PackedCall {
    pub value: Value,
    pub type_index: Value,
}

impl<M: Module> FunctionTranslator<'_, '_, '_, M> {
    /// Calls `name` with the tagged values `stack[begin..end]`; the callee writes its result
    /// to `stack[end]`.
    pub(crate) fn emit_packed_call(
        &mut self,
        mode: PackedCallMode,
        name: &str,
        stack: Value,
        begin: i64,
        end: i64,
        ret: DataType,
    ) -> Result<PackedCall> {
        let stride = i64::from(self.session.catalog.ffi_any.size);
        let args = self.emitter.offset_addr(stack, begin * stride);
        let result = self.emitter.offset_addr(stack, end * stride);
        let nargs = self.emitter.iconst(types::I32, end - begin);

        let status = match mode {
            PackedCallMode::Lookup => {
                let handle = self.resolve_handle(name)?;
                self.call_runtime_status(RuntimeFn::FfiFunctionCall, &[handle, args, nargs, result])?
            }
            PackedCallMode::Direct => {
                let ptr = self.emitter.pointer_type();
                let sig = abi::packed_c_signature(ptr, self.session.call_conv);
                let null = self.emitter.null_ptr();
                match self.call_import(name, &sig, &[null, args, nargs, result])? {
                    Some(status) => status,
                    None => self.emitter.iconst(types::I32, 0),
                }
            }
        };
        self.check_call_success(status);

        let type_index_offset = self.session.catalog.ffi_any.field(field::ANY_TYPE_INDEX)?.offset;
        let payload_offset = self.session.catalog.ffi_any.field(field::ANY_PAYLOAD)?.offset;
        let type_index = self.emitter.load(types::I32, result, type_index_offset as i32);

        let value = if ret.is_void() {
            self.emitter.iconst(types::I32, 0)
        } else {
            let stored = match ret.code {
                TypeCode::Float => DataType::float64(),
                TypeCode::Handle => DataType::handle(),
                _ => DataType::int64(),
            };
            let ty = self.clif_type(stored)?;
            let raw = self.emitter.load(ty, result, payload_offset as i32);
            self.convert(raw, stored, ret)?
        };
        Ok(PackedCall { value, type_index })
    }

    /// Joins the result of a traced call: the callee's value if it returned one, `traced`
    /// otherwise.
    pub(crate) fn select_traced(&mut self, call: PackedCall, traced: Value) -> Value {
        let ty = self.emitter.value_type(traced);
        let returned = self
            .emitter
            .ins()
            .icmp_imm(IntCC::NotEqual, call.type_index, i64::from(type_index::NONE));
        let update = self.emitter.create_block();
        let (merge, value) = self.emitter.create_block_with_param(ty);
        self.emitter.branch_if(returned, update, &[], merge, &[traced]);
        self.emitter.switch_to(update);
        self.emitter.jump(merge, &[call.value]);
        self.emitter.switch_to(merge);
        value
    }
}

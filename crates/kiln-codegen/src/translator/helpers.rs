// Calls into the runtime and other module-level symbols, and the status check shared by all of
// them.

use cranelift_codegen::ir::condcodes::IntCC;
use cranelift_codegen::ir::{types, InstBuilder, Signature, Value};
use cranelift_module::{DataId, FuncId, Module};

use super::FunctionTranslator;
use crate::abi::RuntimeFn;
use crate::options::RuntimeBinding;
use crate::Result;

impl<M: Module> FunctionTranslator<'_, '_, '_, M> {
    /// Calls a runtime entry point, directly or through its context slot.
    pub(crate) fn call_runtime(&mut self, rt: RuntimeFn, args: &[Value]) -> Result<Option<Value>> {
        match self.session.binding() {
            RuntimeBinding::DirectImport => {
                let id = self.session.runtime_import(rt)?;
                Ok(self.call_function(id, args))
            }
            RuntimeBinding::ContextSlots => {
                let slot = self.session.context_slot(rt)?;
                let slot_addr = self.data_addr(slot);
                let ptr = self.emitter.pointer_type();
                let callee = self.emitter.load(ptr, slot_addr, 0);
                let sig = rt.signature(ptr, self.session.call_conv);
                Ok(self.emitter.call_indirect(sig, callee, args))
            }
        }
    }

    /// Runtime call returning an `i32` status.
    pub(crate) fn call_runtime_status(&mut self, rt: RuntimeFn, args: &[Value]) -> Result<Value> {
        let status = self.call_runtime(rt, args)?;
        Ok(match status {
            Some(status) => status,
            None => self.emitter.iconst(types::I32, 0),
        })
    }

    pub(crate) fn call_function(&mut self, id: FuncId, args: &[Value]) -> Option<Value> {
        let func_ref = self.func_ref(id);
        self.emitter.call(func_ref, args)
    }

    /// Calls an external symbol by exact name.
    pub(crate) fn call_import(&mut self, name: &str, sig: &Signature, args: &[Value]) -> Result<Option<Value>> {
        let id = self.session.import_function(name, sig)?;
        Ok(self.call_function(id, args))
    }

    pub(crate) fn function_addr(&mut self, id: FuncId) -> Value {
        let func_ref = self.func_ref(id);
        self.emitter.func_addr(func_ref)
    }

    pub(crate) fn data_addr(&mut self, id: DataId) -> Value {
        let gv = self.data_ref(id);
        self.emitter.symbol_addr(gv)
    }

    /// Pointer to a pooled NUL-terminated string.
    pub(crate) fn string_ptr(&mut self, value: &str) -> Result<Value> {
        let id = self.session.string_constant(value)?;
        Ok(self.data_addr(id))
    }

    /// Returns `status` from the current function unless it is zero; code continues on the
    /// success edge.
    pub(crate) fn check_call_success(&mut self, status: Value) {
        let ok = self.emitter.ins().icmp_imm(IntCC::Equal, status, 0);
        let fail = self.emitter.create_cold_block();
        let cont = self.emitter.create_block();
        self.emitter.branch_if(ok, cont, &[], fail, &[]);
        self.emitter.switch_to(fail);
        self.emitter.ret(&[status]);
        self.emitter.switch_to(cont);
    }

    /// Loads the module context pointer.
    pub(crate) fn module_ctx(&mut self) -> Value {
        let ctx = self.session.module_ctx();
        let addr = self.data_addr(ctx);
        let ptr = self.emitter.pointer_type();
        self.emitter.load(ptr, addr, 0)
    }
}

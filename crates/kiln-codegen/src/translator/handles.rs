// Lazily resolved handles of externally registered callables.
//
// Each name gets a module-private cell and a resolver function. Call sites load the cell and only
// call the resolver while it still holds null.

use cranelift_codegen::ir::condcodes::IntCC;
use cranelift_codegen::ir::{types, InstBuilder, Value};
use cranelift_module::Module;

use super::{build_function, FunctionTranslator, Scope};
use crate::abi::{self, RuntimeFn};
use crate::session::HandleEntry;
use crate::Result;

impl<M: Module> FunctionTranslator<'_, '_, '_, M> {
    /// Handle of the callable registered as `name`, resolved on first use.
    pub(crate) fn resolve_handle(&mut self, name: &str) -> Result<Value> {
        let entry = self.handle_entry(name)?;
        let ptr = self.emitter.pointer_type();
        let cell = self.data_addr(entry.cell);
        let cached = self.emitter.load(ptr, cell, 0);
        let missing = self.emitter.ins().icmp_imm(IntCC::Equal, cached, 0);
        let slow = self.emitter.create_cold_block();
        let (merge, handle) = self.emitter.create_block_with_param(ptr);
        self.emitter.branch_if(missing, slow, &[], merge, &[cached]);

        self.emitter.switch_to(slow);
        let status = match self.call_function(entry.resolver, &[]) {
            Some(status) => status,
            None => self.emitter.iconst(types::I32, 0),
        };
        self.check_call_success(status);
        let resolved = self.emitter.load(ptr, cell, 0);
        self.emitter.jump(merge, &[resolved]);

        self.emitter.switch_to(merge);
        Ok(handle)
    }

    /// Cell and resolver of `name`, created on first reference in the module.
    fn handle_entry(&mut self, name: &str) -> Result<HandleEntry> {
        if let Some(entry) = self.session.handles.get(name) {
            return Ok(*entry);
        }
        let cell = self.session.handle_cell(name)?;
        let resolver_name = format!(".kiln_resolve.{name}");
        let sig = abi::status_signature(&[], self.session.call_conv);
        let resolver = self.session.declare_local_function(&resolver_name, &sig)?;

        build_function(&mut *self.session, resolver, &resolver_name, sig, Scope::default(), |t, _| {
            let ptr = t.emitter.pointer_type();
            let out = t.emitter.stack_alloc(ptr.bytes(), ptr.bytes());
            let ctx = t.module_ctx();
            let name_ptr = t.string_ptr(name)?;
            let status = t.call_runtime_status(RuntimeFn::GetFuncFromEnv, &[ctx, name_ptr, out])?;
            t.check_call_success(status);
            let handle = t.emitter.load(ptr, out, 0);
            let cell_addr = t.data_addr(cell);
            t.emitter.store(handle, cell_addr, 0);
            Ok(())
        })?;

        log::debug!("Created handle cache for {name}");
        let entry = HandleEntry { cell, resolver };
        self.session.handles.insert(name.to_string(), entry);
        Ok(entry)
    }
}

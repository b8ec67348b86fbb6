// Packing of captured variables into a flat record for outlined bodies.

use cranelift_codegen::ir::{Type, Value};
use cranelift_module::Module;
use kiln_layout::RecordLayout;
use kiln_tir::Var;

use super::FunctionTranslator;
use crate::{CodegenError, Result};

/// A packed closure record as seen by the function that built it.
#[derive(Debug, Clone)]
pub(crate) struct ClosureData {
    /// `None` when nothing was captured.
    pub layout: Option<RecordLayout>,
    /// Record address, or null.
    pub data: Value,
    pub nbytes: u32,
}

impl<M: Module> FunctionTranslator<'_, '_, '_, M> {
    /// Stores the current values of `vars` into a fresh stack record, in order.
    pub(crate) fn pack_closure(&mut self, name: &str, vars: &[Var]) -> Result<ClosureData> {
        if vars.is_empty() {
            let data = self.emitter.null_ptr();
            return Ok(ClosureData { layout: None, data, nbytes: 0 });
        }
        let values = vars.iter().map(|var| self.lookup(var)).collect::<Result<Vec<_>>>()?;
        let slot_types: Vec<Type> = values.iter().map(|v| self.emitter.value_type(*v)).collect();
        let layout = self.session.catalog.closure_layout(name, &slot_types)?;

        let data = self.emitter.stack_alloc(layout.size, layout.align);
        for (value, field) in values.iter().zip(&layout.fields) {
            self.emitter.store(*value, data, field.offset as i32);
        }
        log::debug!("Packed {} variables into {name} ({} bytes)", vars.len(), layout.size);
        let nbytes = layout.size;
        Ok(ClosureData { layout: Some(layout), data, nbytes })
    }

    /// Binds each of `vars` to its field of the record at `data`.
    pub(crate) fn unpack_closure(
        &mut self,
        layout: Option<&RecordLayout>,
        data: Value,
        vars: &[Var],
    ) -> Result<()> {
        let Some(layout) = layout else {
            return Ok(());
        };
        let ptr = self.emitter.pointer_type();
        for (var, field) in vars.iter().zip(&layout.fields) {
            let ty = field.ty.clif_type(ptr).ok_or_else(|| CodegenError::UnsupportedType {
                func: self.func_name.clone(),
                dtype: var.dtype,
            })?;
            let value = self.emitter.load(ty, data, field.offset as i32);
            self.bind(var, value);
        }
        Ok(())
    }
}

//! Per-module code generation state.

use cranelift_codegen::ir::{Function, Signature, Type, UserFuncName};
use cranelift_codegen::isa::CallConv;
use cranelift_codegen::Context;
use cranelift_frontend::FunctionBuilderContext;
use cranelift_module::{DataDescription, DataId, FuncId, Linkage, Module};
use kiln_layout::AbiTypeCatalog;
use kiln_tir::PrimFunc;
use rustc_hash::FxHashMap;

use crate::abi::{self, RuntimeFn};
use crate::debug::DebugInfoEmitter;
use crate::emit::FuncEmitter;
use crate::options::{CodegenOptions, RuntimeBinding, MODULE_CTX_SYMBOL};
use crate::{CodegenError, Result};

/// Startup routine registering exported symbols with the runtime.
pub const STARTUP_SYMBOL: &str = "__kiln_module_startup";

/// Holds the name of the module's entry function.
pub const MAIN_SYMBOL: &str = "__kiln_module_main";

/// A symbol registered with the runtime when the module starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportedSymbol {
    Function(FuncId),
    Data(DataId),
}

/// Parameter attributes Cranelift cannot express, reported with the artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionAttrs {
    pub noinline: bool,
    /// Indices of pointer parameters that alias no other parameter.
    pub noalias_params: Vec<usize>,
    /// Known alignment of pointer parameters, by index.
    pub param_align: Vec<(usize, u32)>,
}

/// Lazily created cell and resolver for one externally registered callable.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HandleEntry {
    pub cell: DataId,
    pub resolver: FuncId,
}

/// A function whose body is being lowered.
#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub name: String,
    pub parallel: bool,
}

/// Everything a session produced, handed to the JIT or object driver.
pub struct SessionOutput<M: Module> {
    pub module: M,
    pub functions: Vec<(String, FuncId)>,
    pub context_slots: Vec<(RuntimeFn, DataId)>,
    pub module_ctx: DataId,
    pub exports: Vec<(String, ExportedSymbol)>,
    pub startup: Option<FuncId>,
    pub main_marker: Option<DataId>,
    pub func_attrs: FxHashMap<String, FunctionAttrs>,
    pub debug: DebugInfoEmitter,
    pub clif: Vec<(String, String)>,
    pub link_inputs: Vec<String>,
}

/// Code generation context of one module.
///
/// Generation is single-threaded; every piece of mutable state (handle cache, export table,
/// string pool, attribute table, debug records) lives here and is consumed by `finish`.
pub struct CodeGenCpu<M: Module> {
    pub(crate) module: M,
    pub(crate) options: CodegenOptions,
    pub(crate) catalog: AbiTypeCatalog,
    pub(crate) pointer_type: Type,
    pub(crate) call_conv: CallConv,
    pub(crate) handles: FxHashMap<String, HandleEntry>,
    pub(crate) func_attrs: FxHashMap<String, FunctionAttrs>,
    pub(crate) debug: DebugInfoEmitter,
    pub(crate) link_inputs: Vec<String>,
    binding: RuntimeBinding,
    runtime_imports: FxHashMap<RuntimeFn, FuncId>,
    context_slots: Vec<(RuntimeFn, DataId)>,
    strings: FxHashMap<String, DataId>,
    exports: Vec<(String, ExportedSymbol)>,
    functions: Vec<(String, FuncId)>,
    module_ctx: DataId,
    frames: Vec<Frame>,
    name_counter: usize,
    static_cells: usize,
    clif: Vec<(String, String)>,
    ctx: Context,
}

impl<M: Module> CodeGenCpu<M> {
    pub fn new(mut module: M, options: CodegenOptions) -> Result<Self> {
        let triple = module.isa().triple().clone();
        let catalog = match AbiTypeCatalog::for_triple(&triple.to_string()) {
            Ok(catalog) => catalog,
            Err(_) if triple == target_lexicon::Triple::host() => AbiTypeCatalog::for_host()?,
            Err(err) => return Err(err.into()),
        };
        let config = module.target_config();
        let pointer_type = config.pointer_type();
        if catalog.pointer_bytes * 8 != pointer_type.bits() {
            return Err(CodegenError::IsaSetupError(format!(
                "target pointers are {} bits but runtime records are laid out for {} bits",
                pointer_type.bits(),
                catalog.pointer_bytes * 8
            )));
        }

        let linkage = if options.registers_system_symbols() {
            Linkage::Export
        } else {
            Linkage::Preemptible
        };
        let module_ctx = module.declare_data(&options.module_ctx_symbol(), linkage, true, false)?;
        let mut desc = DataDescription::new();
        desc.define_zeroinit(catalog.pointer_bytes as usize);
        desc.set_align(u64::from(catalog.pointer_bytes));
        module.define_data(module_ctx, &desc)?;

        let mut exports = Vec::new();
        if options.registers_system_symbols() {
            exports.push((MODULE_CTX_SYMBOL.to_string(), ExportedSymbol::Data(module_ctx)));
        }

        let debug = DebugInfoEmitter::new(options.debug_info, catalog.pointer_bytes as u8);
        let ctx = module.make_context();
        Ok(CodeGenCpu {
            binding: options.runtime_binding(),
            call_conv: config.default_call_conv,
            module,
            options,
            catalog,
            pointer_type,
            handles: FxHashMap::default(),
            func_attrs: FxHashMap::default(),
            debug,
            link_inputs: Vec::new(),
            runtime_imports: FxHashMap::default(),
            context_slots: Vec::new(),
            strings: FxHashMap::default(),
            exports,
            functions: Vec::new(),
            module_ctx,
            frames: Vec::new(),
            name_counter: 0,
            static_cells: 0,
            clif: Vec::new(),
            ctx,
        })
    }

    pub fn options(&self) -> &CodegenOptions {
        &self.options
    }

    pub fn catalog(&self) -> &AbiTypeCatalog {
        &self.catalog
    }

    pub(crate) fn binding(&self) -> RuntimeBinding {
        self.binding
    }

    pub(crate) fn module_ctx(&self) -> DataId {
        self.module_ctx
    }

    fn is_declared(&self, name: &str) -> bool {
        self.functions.iter().any(|(existing, _)| existing == name)
    }

    /// Signature of an IR function: its parameters by value, int32 status result.
    pub fn signature_of(&self, func: &PrimFunc) -> Result<Signature> {
        if func.ret_type != kiln_tir::DataType::int32() {
            return Err(CodegenError::InvalidReturnType {
                func: func.name.clone(),
                dtype: func.ret_type,
            });
        }
        let params = func
            .params
            .iter()
            .map(|var| {
                abi::clif_type(var.dtype, self.pointer_type).ok_or_else(|| {
                    CodegenError::UnsupportedType { func: func.name.clone(), dtype: var.dtype }
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(abi::status_signature(&params, self.call_conv))
    }

    /// Declares an IR function; functions with a global symbol are exported.
    pub fn declare_function(&mut self, func: &PrimFunc) -> Result<FuncId> {
        let name = func.symbol().to_string();
        if self.is_declared(&name) {
            return Err(CodegenError::DuplicateFunction(name));
        }
        let sig = self.signature_of(func)?;
        let exported = func.attrs.global_symbol.is_some();
        let linkage = if exported { Linkage::Export } else { Linkage::Local };
        let id = self.module.declare_function(&name, linkage, &sig)?;
        log::debug!("Declared {} function {}", if exported { "exported" } else { "local" }, name);

        if exported && self.options.registers_system_symbols() {
            self.exports.push((name.clone(), ExportedSymbol::Function(id)));
        }
        self.debug.add_function(&name, &func.params, !exported);
        self.functions.push((name, id));
        Ok(id)
    }

    /// Lowers the body of a function declared with `declare_function`.
    pub fn add_function(&mut self, func: &PrimFunc, id: FuncId) -> Result<()> {
        crate::translator::lower_function(self, func, id)
    }

    /// Declares a module-private helper function generated during lowering.
    pub(crate) fn declare_local_function(&mut self, name: &str, sig: &Signature) -> Result<FuncId> {
        if self.is_declared(name) {
            return Err(CodegenError::DuplicateFunction(name.to_string()));
        }
        let id = self.module.declare_function(name, Linkage::Local, sig)?;
        self.functions.push((name.to_string(), id));
        Ok(id)
    }

    /// Declares an external symbol called by exact name.
    pub(crate) fn import_function(&mut self, name: &str, sig: &Signature) -> Result<FuncId> {
        Ok(self.module.declare_function(name, Linkage::Import, sig)?)
    }

    pub(crate) fn runtime_import(&mut self, rt: RuntimeFn) -> Result<FuncId> {
        if let Some(id) = self.runtime_imports.get(&rt) {
            return Ok(*id);
        }
        let sig = rt.signature(self.pointer_type, self.call_conv);
        let id = self.import_function(rt.symbol(), &sig)?;
        self.runtime_imports.insert(rt, id);
        Ok(id)
    }

    /// Pointer-sized global the loader fills with the address of `rt`.
    pub(crate) fn context_slot(&mut self, rt: RuntimeFn) -> Result<DataId> {
        if let Some((_, id)) = self.context_slots.iter().find(|(slot, _)| *slot == rt) {
            return Ok(*id);
        }
        let id = self.pointer_cell(&rt.slot_name(), Linkage::Preemptible)?;
        log::debug!("Created context slot {}", rt.slot_name());
        self.context_slots.push((rt, id));
        Ok(id)
    }

    fn pointer_cell(&mut self, name: &str, linkage: Linkage) -> Result<DataId> {
        let id = self.module.declare_data(name, linkage, true, false)?;
        let mut desc = DataDescription::new();
        desc.define_zeroinit(self.catalog.pointer_bytes as usize);
        desc.set_align(u64::from(self.catalog.pointer_bytes));
        self.module.define_data(id, &desc)?;
        Ok(id)
    }

    /// Zero-initialized cell caching the handle of `name`.
    pub(crate) fn handle_cell(&mut self, name: &str) -> Result<DataId> {
        self.pointer_cell(&format!(".kiln_func.{name}"), Linkage::Local)
    }

    /// Fresh module-private pointer cell, null until first written.
    pub(crate) fn new_static_cell(&mut self) -> Result<DataId> {
        let name = format!(".kiln_static_handle.{}", self.static_cells);
        self.static_cells += 1;
        self.pointer_cell(&name, Linkage::Local)
    }

    /// NUL-terminated string constant, pooled per module.
    pub(crate) fn string_constant(&mut self, value: &str) -> Result<DataId> {
        if let Some(id) = self.strings.get(value) {
            return Ok(*id);
        }
        let name = format!(".kiln_str.{}", self.strings.len());
        let id = self.module.declare_data(&name, Linkage::Local, false, false)?;
        let mut bytes = Vec::with_capacity(value.len() + 1);
        bytes.extend_from_slice(value.as_bytes());
        bytes.push(0);
        let mut desc = DataDescription::new();
        desc.define(bytes.into_boxed_slice());
        self.module.define_data(id, &desc)?;
        self.strings.insert(value.to_string(), id);
        Ok(id)
    }

    pub(crate) fn push_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub(crate) fn pop_frame(&mut self) {
        self.frames.pop();
    }

    /// Whether any function being lowered runs inside a parallel launch.
    pub(crate) fn in_parallel_env(&self) -> bool {
        self.frames.iter().any(|frame| frame.parallel)
    }

    /// Unique helper name derived from the outermost function being lowered.
    pub(crate) fn fresh_name(&mut self, kind: &str) -> String {
        let root = self.frames.first().map(|frame| frame.name.as_str()).unwrap_or("kiln");
        let name = format!("{root}_{kind}{}", self.name_counter);
        self.name_counter += 1;
        name
    }

    pub(crate) fn define_function(&mut self, id: FuncId, name: &str, func: Function) -> Result<()> {
        if self.options.clif_dump {
            self.clif.push((name.to_string(), func.display().to_string()));
        }
        self.ctx.func = func;
        let result = self.module.define_function(id, &mut self.ctx);
        self.module.clear_context(&mut self.ctx);
        result?;
        log::debug!("Defined {name}");
        Ok(())
    }

    /// Emits the startup routine and the entry marker, and hands the module over.
    pub fn finish(mut self) -> Result<SessionOutput<M>> {
        let main_marker = match self.options.emit_main.clone() {
            Some(entry) => {
                if !self.is_declared(&entry) {
                    return Err(CodegenError::MissingMainFunction(entry));
                }
                let id = self.module.declare_data(MAIN_SYMBOL, Linkage::Preemptible, false, false)?;
                let mut desc = DataDescription::new();
                let mut bytes = entry.into_bytes();
                bytes.push(0);
                desc.define(bytes.into_boxed_slice());
                self.module.define_data(id, &desc)?;
                Some(id)
            }
            None => None,
        };

        let startup = if self.options.registers_system_symbols() && !self.exports.is_empty() {
            Some(self.emit_startup()?)
        } else {
            None
        };

        log::info!(
            "Finished module {}: {} functions, {} handle caches, {} exports",
            self.options.module_name,
            self.functions.len(),
            self.handles.len(),
            self.exports.len()
        );

        Ok(SessionOutput {
            module: self.module,
            functions: self.functions,
            context_slots: self.context_slots,
            module_ctx: self.module_ctx,
            exports: self.exports,
            startup,
            main_marker,
            func_attrs: self.func_attrs,
            debug: self.debug,
            clif: self.clif,
            link_inputs: self.link_inputs,
        })
    }

    fn emit_startup(&mut self) -> Result<FuncId> {
        let sig = Signature::new(self.call_conv);
        let id = self.module.declare_function(STARTUP_SYMBOL, Linkage::Local, &sig)?;
        let register = self.runtime_import(RuntimeFn::RegisterSystemSymbol)?;
        let exports = self.exports.clone();

        let mut func = Function::with_name_signature(UserFuncName::user(0, id.as_u32()), sig);
        let mut fctx = FunctionBuilderContext::new();
        let mut emitter = FuncEmitter::new(&mut func, &mut fctx, self.pointer_type);
        let register = self.module.declare_func_in_func(register, emitter.func());
        for (name, symbol) in &exports {
            let name_id = self.string_constant(name)?;
            let name_gv = self.module.declare_data_in_func(name_id, emitter.func());
            let name_ptr = emitter.symbol_addr(name_gv);
            let addr = match *symbol {
                ExportedSymbol::Function(func_id) => {
                    let func_ref = self.module.declare_func_in_func(func_id, emitter.func());
                    emitter.func_addr(func_ref)
                }
                ExportedSymbol::Data(data_id) => {
                    let gv = self.module.declare_data_in_func(data_id, emitter.func());
                    emitter.symbol_addr(gv)
                }
            };
            emitter.call(register, &[name_ptr, addr]);
        }
        emitter.ret(&[]);
        emitter.finish();

        self.define_function(id, STARTUP_SYMBOL, func)?;
        log::info!("Emitted {STARTUP_SYMBOL} registering {} symbols", exports.len());
        Ok(id)
    }
}

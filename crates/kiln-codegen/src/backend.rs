use crate::abi::RuntimeFn;
use crate::debug::{DwarfSections, Subprogram};
use crate::options::CodegenOptions;
use crate::session::{CodeGenCpu, ExportedSymbol, FunctionAttrs, SessionOutput};
use crate::{CodegenError, Result};
use cranelift_codegen::gimli::{RunTimeEndian, SectionId};
use cranelift_codegen::ir::Endianness;
use cranelift_codegen::isa::{self, TargetIsa};
use cranelift_codegen::settings::{self, Configurable};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{default_libcall_names, Module};
use cranelift_object::{ObjectBuilder, ObjectModule, ObjectProduct};
use kiln_tir::PrimFunc;
use object::write::{Relocation, SectionId as ObjectSectionId, StandardSegment};
use object::{BinaryFormat, RelocationEncoding, RelocationFlags, RelocationKind, SectionFlags, SectionKind};
use rustc_hash::FxHashMap;
use std::ffi::c_void;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use target_lexicon::Triple;

/// Builds the target ISA described by `options`.
///
/// `pic` is set for object output; JIT code is placed by the loader and stays non-PIC.
pub fn build_isa(options: &CodegenOptions, pic: bool) -> Result<Arc<dyn TargetIsa>> {
    let mut flag_builder = settings::builder();
    flag_builder.set("is_pic", if pic { "true" } else { "false" })?;
    flag_builder.set("opt_level", options.opt_level.as_setting())?;
    flag_builder.set("enable_verifier", if options.verify { "true" } else { "false" })?;
    if !pic {
        flag_builder.set("use_colocated_libcalls", "false")?;
    }
    let flags = settings::Flags::new(flag_builder);

    let isa_builder = if options.target == "host" {
        cranelift_native::builder()
            .map_err(|e| CodegenError::IsaSetupError(format!("Host target lookup failed: {}", e)))?
    } else {
        let triple = Triple::from_str(&options.target)
            .map_err(|e| CodegenError::IsaSetupError(format!("Invalid target {}: {}", options.target, e)))?;
        isa::lookup(triple)
            .map_err(|e| CodegenError::IsaSetupError(format!("Unsupported target {}: {}", options.target, e)))?
    };
    isa_builder
        .finish(flags)
        .map_err(|e| CodegenError::IsaSetupError(format!("ISA construction failed: {}", e)))
}

/// Declares every function, lowers every body and finalizes the module.
///
/// All functions are declared before any body is lowered, so calls may refer forward.
pub fn lower_module<M: Module>(
    module: M,
    functions: &[PrimFunc],
    options: CodegenOptions,
) -> Result<SessionOutput<M>> {
    let mut session = CodeGenCpu::new(module, options)?;
    let ids = functions
        .iter()
        .map(|func| session.declare_function(func))
        .collect::<Result<Vec<_>>>()?;
    for (func, id) in functions.iter().zip(ids) {
        session.add_function(func, id)?;
    }
    session.finish()
}

/// A function compiled into executable memory.
#[derive(Debug, Clone, Copy)]
pub struct CompiledFunction {
    pub func_ptr: *const u8,
}

/// Module compiled in-process.
///
/// Context slots and the module context are left null; the loader fills them before any
/// function runs.
pub struct JitArtifact {
    functions: FxHashMap<String, CompiledFunction>,
    context_slots: Vec<(RuntimeFn, *mut *const u8)>,
    module_ctx: *mut *mut c_void,
    exports: Vec<(String, *const u8)>,
    startup: Option<*const u8>,
    entry: Option<String>,
    func_attrs: FxHashMap<String, FunctionAttrs>,
    subprograms: Vec<Subprogram>,
    clif: Vec<(String, String)>,
    #[allow(dead_code)] // Needs to be kept alive for the function pointers to be valid
    jit_module: Option<JITModule>,
}

// Manual Debug implementation since JITModule doesn't implement Debug
impl fmt::Debug for JitArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JitArtifact")
            .field("functions", &self.functions)
            .field("context_slots", &self.context_slots)
            .field("module_ctx", &self.module_ctx)
            .field("exports", &self.exports)
            .field("startup", &self.startup)
            .field("jit_module", &"[JITModule]")
            .finish()
    }
}

impl JitArtifact {
    pub fn get_function_ptr(&self, name: &str) -> Option<*const u8> {
        self.functions.get(name).map(|f| f.func_ptr)
    }

    /// Cast a function pointer to a callable Rust function.
    ///
    /// # Safety
    ///
    /// The caller must ensure `F` is an `extern "C"` function pointer type matching the compiled
    /// signature, and that context slots were filled if the module uses them.
    pub unsafe fn get_function<F: Copy>(&self, name: &str) -> Option<F> {
        self.get_function_ptr(name)
            .map(|f_ptr| std::mem::transmute_copy(&f_ptr))
    }

    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    /// Pointer-sized globals the loader fills with runtime entry points.
    pub fn context_slots(&self) -> &[(RuntimeFn, *mut *const u8)] {
        &self.context_slots
    }

    /// Address of the module context global.
    pub fn module_ctx(&self) -> *mut *mut c_void {
        self.module_ctx
    }

    pub fn exports(&self) -> &[(String, *const u8)] {
        &self.exports
    }

    /// Startup routine registering the exports, if the module has one.
    pub fn startup(&self) -> Option<*const u8> {
        self.startup
    }

    /// Name of the entry function recorded with `emit_main`.
    pub fn entry(&self) -> Option<&str> {
        self.entry.as_deref()
    }

    pub fn func_attrs(&self) -> &FxHashMap<String, FunctionAttrs> {
        &self.func_attrs
    }

    pub fn subprograms(&self) -> &[Subprogram] {
        &self.subprograms
    }

    pub fn clif(&self) -> &[(String, String)] {
        &self.clif
    }
}

/// Compiles `functions` into executable memory.
///
/// `symbols` resolve imported names (runtime entry points, packed functions, externs); names
/// not listed are looked up in the process.
pub fn compile_jit(
    functions: &[PrimFunc],
    options: CodegenOptions,
    symbols: &[(String, *const u8)],
) -> Result<JitArtifact> {
    let isa = build_isa(&options, false)?;
    let mut builder = JITBuilder::with_isa(isa, default_libcall_names());
    for (name, ptr) in symbols {
        builder.symbol(name.clone(), *ptr);
    }
    let jit_module = JITModule::new(builder);
    let entry = options.emit_main.clone();
    let output = lower_module(jit_module, functions, options)?;
    let SessionOutput {
        module: mut jit_module,
        functions: declared,
        context_slots,
        module_ctx,
        exports,
        startup,
        func_attrs,
        debug,
        clif,
        ..
    } = output;

    jit_module.finalize_definitions()?;

    let functions = declared
        .iter()
        .map(|(name, id)| {
            let func_ptr = jit_module.get_finalized_function(*id);
            (name.clone(), CompiledFunction { func_ptr })
        })
        .collect();
    let context_slots = context_slots
        .iter()
        .map(|(rt, id)| (*rt, jit_module.get_finalized_data(*id).0 as *mut *const u8))
        .collect();
    let module_ctx = jit_module.get_finalized_data(module_ctx).0 as *mut *mut c_void;
    let exports = exports
        .iter()
        .map(|(name, symbol)| {
            let ptr = match *symbol {
                ExportedSymbol::Function(id) => jit_module.get_finalized_function(id),
                ExportedSymbol::Data(id) => jit_module.get_finalized_data(id).0,
            };
            (name.clone(), ptr)
        })
        .collect();
    let startup = startup.map(|id| jit_module.get_finalized_function(id));
    log::info!("JIT compiled {} functions", declared.len());

    Ok(JitArtifact {
        functions,
        context_slots,
        module_ctx,
        exports,
        startup,
        entry,
        func_attrs,
        subprograms: debug.into_subprograms(),
        clif,
        jit_module: Some(jit_module),
    })
}

/// Relocatable object file produced by `compile_object`.
#[derive(Debug, Clone)]
pub struct ObjectArtifact {
    pub bytes: Vec<u8>,
    /// Objects and archives named by `pragma_import_object`, to be linked alongside.
    pub link_inputs: Vec<String>,
    pub func_attrs: FxHashMap<String, FunctionAttrs>,
    pub clif: Vec<(String, String)>,
}

/// Compiles `functions` into a relocatable object for the configured target.
pub fn compile_object(functions: &[PrimFunc], options: CodegenOptions) -> Result<ObjectArtifact> {
    let isa = build_isa(&options, true)?;
    let endian = match isa.endianness() {
        Endianness::Little => RunTimeEndian::Little,
        Endianness::Big => RunTimeEndian::Big,
    };
    let pointer_bytes = isa.pointer_bytes();
    let builder = ObjectBuilder::new(isa, options.module_name.clone(), default_libcall_names())?;
    let module_name = options.module_name.clone();
    let output = lower_module(ObjectModule::new(builder), functions, options)?;

    let dwarf = output.debug.write_dwarf(&module_name, endian)?;
    let mut product = output.module.finish();
    if let Some(startup) = output.startup {
        add_constructor(&mut product, startup, pointer_bytes)?;
    }
    if let Some(dwarf) = dwarf {
        add_debug_sections(&mut product, &dwarf)?;
    }
    let bytes = product.emit().map_err(|e| CodegenError::ObjectEmit(e.to_string()))?;
    log::info!("Emitted object {} ({} bytes)", module_name, bytes.len());

    Ok(ObjectArtifact {
        bytes,
        link_inputs: output.link_inputs,
        func_attrs: output.func_attrs,
        clif: output.clif,
    })
}

/// Schedules `func` in the platform's constructor table.
fn add_constructor(
    product: &mut ObjectProduct,
    func: cranelift_module::FuncId,
    pointer_bytes: u8,
) -> Result<()> {
    let symbol = product.function_symbol(func);
    let object = &mut product.object;
    let section = match object.format() {
        BinaryFormat::Elf => {
            let id = object.add_section(
                Vec::new(),
                b".init_array".to_vec(),
                SectionKind::Elf(object::elf::SHT_INIT_ARRAY),
            );
            object.section_mut(id).flags = SectionFlags::Elf {
                sh_flags: u64::from(object::elf::SHF_ALLOC | object::elf::SHF_WRITE),
            };
            id
        }
        BinaryFormat::MachO => {
            let id = object.add_section(b"__DATA".to_vec(), b"__mod_init_func".to_vec(), SectionKind::Data);
            object.section_mut(id).flags = SectionFlags::MachO {
                flags: object::macho::S_MOD_INIT_FUNC_POINTERS,
            };
            id
        }
        BinaryFormat::Coff => {
            object.add_section(Vec::new(), b".CRT$XCU".to_vec(), SectionKind::ReadOnlyData)
        }
        other => {
            return Err(CodegenError::ObjectEmit(format!(
                "no constructor section for {other:?} objects"
            )))
        }
    };
    let size = usize::from(pointer_bytes);
    let offset = object.append_section_data(section, &vec![0; size], u64::from(pointer_bytes));
    object
        .add_relocation(
            section,
            Relocation {
                offset,
                symbol,
                addend: 0,
                flags: RelocationFlags::Generic {
                    kind: RelocationKind::Absolute,
                    encoding: RelocationEncoding::Generic,
                    size: pointer_bytes * 8,
                },
            },
        )
        .map_err(|e| CodegenError::ObjectEmit(e.to_string()))?;
    log::debug!("Registered module startup in the constructor table");
    Ok(())
}

fn add_debug_sections(product: &mut ObjectProduct, dwarf: &DwarfSections) -> Result<()> {
    let object = &mut product.object;
    let format = object.format();
    let debug_segment = object.segment_name(StandardSegment::Debug).to_vec();
    let mut ids: FxHashMap<SectionId, ObjectSectionId> = FxHashMap::default();
    for section in &dwarf.sections {
        let id = match format {
            BinaryFormat::MachO => object.add_section(
                debug_segment.clone(),
                section.id.name().replacen('.', "__", 1).into_bytes(),
                SectionKind::Debug,
            ),
            _ => object.add_section(Vec::new(), section.id.name().as_bytes().to_vec(), SectionKind::Debug),
        };
        object.append_section_data(id, &section.data, 1);
        ids.insert(section.id, id);
    }

    // Mach-O debug sections are addressed by plain section offsets.
    if format == BinaryFormat::MachO {
        return Ok(());
    }
    let kind = if format == BinaryFormat::Coff {
        RelocationKind::SectionOffset
    } else {
        RelocationKind::Absolute
    };
    for section in &dwarf.sections {
        for reloc in &section.relocs {
            let target = ids.get(&reloc.target).ok_or_else(|| {
                CodegenError::DebugInfo(format!("{} refers to missing {}", section.id.name(), reloc.target.name()))
            })?;
            let symbol = object.section_symbol(*target);
            object
                .add_relocation(
                    ids[&section.id],
                    Relocation {
                        offset: u64::from(reloc.offset),
                        symbol,
                        addend: reloc.addend,
                        flags: RelocationFlags::Generic {
                            kind,
                            encoding: RelocationEncoding::Generic,
                            size: reloc.size * 8,
                        },
                    },
                )
                .map_err(|e| CodegenError::ObjectEmit(e.to_string()))?;
        }
    }
    Ok(())
}

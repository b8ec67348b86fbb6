//! Runtime entry points and the call signatures shared with the runtime.

use cranelift_codegen::ir::{types, AbiParam, Signature, Type};
use cranelift_codegen::isa::CallConv;
use kiln_tir::{DataType, TypeCode};

/// Runtime entry points reached through the configured `RuntimeBinding`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeFn {
    FfiFunctionCall,
    ErrorSetRaised,
    GetFuncFromEnv,
    ParallelLaunch,
    ParallelBarrier,
    RegisterSystemSymbol,
    AllocWorkspace,
    FreeWorkspace,
}

/// Default run-once entry used by static initialization regions.
pub const RUN_ONCE_SYMBOL: &str = "kiln_backend_run_once";

impl RuntimeFn {
    pub const ALL: [RuntimeFn; 8] = [
        RuntimeFn::FfiFunctionCall,
        RuntimeFn::ErrorSetRaised,
        RuntimeFn::GetFuncFromEnv,
        RuntimeFn::ParallelLaunch,
        RuntimeFn::ParallelBarrier,
        RuntimeFn::RegisterSystemSymbol,
        RuntimeFn::AllocWorkspace,
        RuntimeFn::FreeWorkspace,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            RuntimeFn::FfiFunctionCall => "kiln_ffi_function_call",
            RuntimeFn::ErrorSetRaised => "kiln_ffi_error_set_raised",
            RuntimeFn::GetFuncFromEnv => "kiln_backend_get_func_from_env",
            RuntimeFn::ParallelLaunch => "kiln_backend_parallel_launch",
            RuntimeFn::ParallelBarrier => "kiln_backend_parallel_barrier",
            RuntimeFn::RegisterSystemSymbol => "kiln_backend_register_system_lib_symbol",
            RuntimeFn::AllocWorkspace => "kiln_backend_alloc_workspace",
            RuntimeFn::FreeWorkspace => "kiln_backend_free_workspace",
        }
    }

    pub fn from_symbol(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|rt| rt.symbol() == name)
    }

    /// Name of the context slot holding this entry point.
    pub fn slot_name(self) -> String {
        format!("__{}", self.symbol())
    }

    pub fn signature(self, ptr: Type, call_conv: CallConv) -> Signature {
        let i32 = types::I32;
        match self {
            RuntimeFn::FfiFunctionCall => packed_c_signature(ptr, call_conv),
            RuntimeFn::ErrorSetRaised => signature(call_conv, &[ptr, ptr], None),
            RuntimeFn::GetFuncFromEnv => signature(call_conv, &[ptr, ptr, ptr], Some(i32)),
            RuntimeFn::ParallelLaunch => signature(call_conv, &[ptr, ptr, i32], Some(i32)),
            RuntimeFn::ParallelBarrier => signature(call_conv, &[i32, ptr], Some(i32)),
            RuntimeFn::RegisterSystemSymbol => signature(call_conv, &[ptr, ptr], Some(i32)),
            RuntimeFn::AllocWorkspace => {
                signature(call_conv, &[i32, i32, types::I64, i32, i32], Some(ptr))
            }
            RuntimeFn::FreeWorkspace => signature(call_conv, &[i32, i32, ptr], Some(i32)),
        }
    }
}

pub fn signature(call_conv: CallConv, params: &[Type], ret: Option<Type>) -> Signature {
    let mut sig = Signature::new(call_conv);
    sig.params.extend(params.iter().map(|ty| AbiParam::new(*ty)));
    sig.returns.extend(ret.map(AbiParam::new));
    sig
}

/// `(self, args, nargs, result) -> status`
pub fn packed_c_signature(ptr: Type, call_conv: CallConv) -> Signature {
    signature(call_conv, &[ptr, ptr, types::I32, ptr], Some(types::I32))
}

/// `(task_id, penv, cdata) -> status`
pub fn parallel_lambda_signature(ptr: Type, call_conv: CallConv) -> Signature {
    signature(call_conv, &[types::I32, ptr, ptr], Some(types::I32))
}

/// `(cdata) -> status`
pub fn static_init_callback_signature(ptr: Type, call_conv: CallConv) -> Signature {
    signature(call_conv, &[ptr], Some(types::I32))
}

/// `(handle_cell, callback, cdata, nbytes) -> status`
pub fn static_init_signature(ptr: Type, call_conv: CallConv) -> Signature {
    signature(call_conv, &[ptr, ptr, ptr, types::I32], Some(types::I32))
}

/// Signature of a lowered IR function: one parameter per value, int32 status result.
pub fn status_signature(params: &[Type], call_conv: CallConv) -> Signature {
    signature(call_conv, params, Some(types::I32))
}

/// Cranelift type of a scalar IR value. Bools are bytes, handles are pointers.
pub fn clif_type(dtype: DataType, ptr: Type) -> Option<Type> {
    if !dtype.is_scalar() {
        return None;
    }
    match (dtype.code, dtype.bits) {
        (TypeCode::Int | TypeCode::UInt, 8) => Some(types::I8),
        (TypeCode::Int | TypeCode::UInt, 16) => Some(types::I16),
        (TypeCode::Int | TypeCode::UInt, 32) => Some(types::I32),
        (TypeCode::Int | TypeCode::UInt, 64) => Some(types::I64),
        (TypeCode::Float, 32) => Some(types::F32),
        (TypeCode::Float, 64) => Some(types::F64),
        (TypeCode::Bool, _) => Some(types::I8),
        (TypeCode::Handle, _) => Some(ptr),
        _ => None,
    }
}

use cranelift_codegen::settings::SetError;
use kiln_tir::DataType;
use thiserror::Error;

/// Errors that can occur during native code generation.
///
/// Lowering errors name the function being generated; any of them aborts the whole module.
#[derive(Error, Debug)]
pub enum CodegenError {
    #[error("Failed during Cranelift code generation: {0}")]
    CraneliftGen(#[from] cranelift_codegen::CodegenError),

    #[error("Failed during module processing: {0}")]
    CraneliftModule(#[from] cranelift_module::ModuleError),

    #[error("Failed to configure Cranelift settings: {0}")]
    SettingsError(#[from] SetError),

    #[error("ISA setup failed: {0}")]
    IsaSetupError(String),

    #[error("Layout computation error: {0}")]
    LayoutError(#[from] kiln_layout::LayoutError),

    #[error("Object emission failed: {0}")]
    ObjectEmit(String),

    #[error("Debug info emission failed: {0}")]
    DebugInfo(String),

    #[error("{func}: nested parallel loops are not supported")]
    NestedParallelLoop { func: String },

    #[error("{func}: parallel barrier inside a parallel loop")]
    BarrierInParallelLoop { func: String },

    #[error("{func}: parallel barrier outside a parallel launch")]
    BarrierOutsideParallelEnv { func: String },

    #[error("{func}: stride pattern pragma outside a parallel launch")]
    StridePatternOutsideParallelEnv { func: String },

    #[error("{func}: parallel launch body contains no parallel loop")]
    NoParallelLoopInLaunch { func: String },

    #[error("{func}: parallel loop must start at zero")]
    NonZeroParallelMin { func: String },

    #[error("{func}: static initialization inside a parallel launch")]
    StaticInitInParallelEnv { func: String },

    #[error("{func}: unknown struct field tag {tag}")]
    UnknownStructField { func: String, tag: i64 },

    #[error("{func}: cannot store to the address of an array descriptor")]
    StoreToAddressField { func: String },

    #[error("{func}: unsupported payload type {dtype}")]
    UnsupportedPayloadType { func: String, dtype: DataType },

    #[error("{func}: unknown stack allocation type {ty:?}")]
    UnknownStackAllocType { func: String, ty: String },

    #[error("{func}: {op} expects {expected} arguments, found {found}")]
    IntrinsicArity {
        func: String,
        op: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("{func}: {construct} requires a constant integer")]
    ExpectedConstant { func: String, construct: &'static str },

    #[error("{func}: {construct} requires a string literal")]
    ExpectedString { func: String, construct: &'static str },

    #[error("{func}: variable {var} is not bound")]
    UnboundVariable { func: String, var: String },

    #[error("{func}: unsupported data type {dtype}")]
    UnsupportedType { func: String, dtype: DataType },

    #[error("{func}: cannot apply {op} to {dtype}")]
    TypeMismatch {
        func: String,
        op: &'static str,
        dtype: DataType,
    },

    #[error("{func}: allocation of {buffer} needs a positive extent, found {extent}")]
    InvalidAllocation {
        func: String,
        buffer: String,
        extent: i64,
    },

    #[error("{func}: functions must return int32, found {dtype}")]
    InvalidReturnType { func: String, dtype: DataType },

    #[error("Function {0} is defined more than once")]
    DuplicateFunction(String),

    #[error("Entry function {0} is not part of the module")]
    MissingMainFunction(String),
}

pub type Result<T, E = CodegenError> = std::result::Result<T, E>;

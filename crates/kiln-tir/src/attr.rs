//! Statement attribute keys understood by the CPU backend.

/// Outline the body into its own function; the value is the function name.
pub const COMPUTE_SCOPE: &str = "compute_scope";

/// Run the body once per module; the value names the run-once entry point.
pub const COPROC_UOP_SCOPE: &str = "coproc_uop_scope";

/// Inside a parallel launch, split following parallel loops by stride instead of by block.
pub const PRAGMA_PARALLEL_STRIDE_PATTERN: &str = "pragma_parallel_stride_pattern";

/// Launch the body on the thread pool.
pub const PRAGMA_PARALLEL_LAUNCH_POINT: &str = "pragma_parallel_launch_point";

/// Synchronize all tasks of the enclosing launch after the body.
pub const PRAGMA_PARALLEL_BARRIER_WHEN_FINISH: &str = "pragma_parallel_barrier_when_finish";

/// Record an object file the packaged module must be linked with; the value is its path.
pub const PRAGMA_IMPORT_OBJECT: &str = "pragma_import_object";

const PRAGMA_PREFIX: &str = "pragma_";

pub fn is_pragma_key(key: &str) -> bool {
    key.starts_with(PRAGMA_PREFIX)
}

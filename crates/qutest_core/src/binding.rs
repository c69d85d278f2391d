//! Name the host binding a harness page reports through.
//!
//! Bindings are global to a browser session, so every job gets its own name derived from a job id. The name is also
//! passed to the harness page in its URL, which is why it is restricted to a conservative identifier alphabet.

/// Prefix shared by every capture binding.
pub const BINDING_PREFIX: &str = "__qutest_run_end_";

const MAX_BINDING_LEN: usize = 64;

/// Build the binding name for a job.
///
/// ## Parameters
/// - `job_id`: a process-unique job number.
///
/// ## Returns
/// - (`String`): a JavaScript identifier such as `__qutest_run_end_7`.
pub fn binding_name(job_id: u64) -> String {
    format!("{BINDING_PREFIX}{job_id}")
}

/// Check that a name is one this crate could have produced.
///
/// The harness server uses this before embedding a requested name in a page.
pub fn is_valid_binding_name(name: &str) -> bool {
    let Some(suffix) = name.strip_prefix(BINDING_PREFIX) else {
        return false;
    };
    name.len() <= MAX_BINDING_LEN && !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit())
}

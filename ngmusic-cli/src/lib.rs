//! Shared plumbing for the `adpcmtool`/`nsstool`/`vromtool` binaries.

use ngmusic::compiler::Diagnostics;
use ngmusic::module::Module;
use tracing_subscriber::EnvFilter;

/// Installs a `tracing-subscriber` that writes to stderr, defaulting to `info` level (`debug` when
/// `-v`/`--verbose` is given) unless overridden by `RUST_LOG`.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}

/// Flushes a compiler run's warnings to the log via `tracing::warn!`, resolving each warning's
/// source row from `module` for context.
pub fn flush_diagnostics(diagnostics: &Diagnostics, module: &Module) {
    for line in diagnostics.render(|loc| {
        let pattern_id = *module.orders.get(loc.order as usize)?.get(loc.channel as usize)?;
        module.pattern(pattern_id, loc.channel)?.rows.get(loc.row as usize).cloned()
    }) {
        tracing::warn!("{}", line);
    }
}

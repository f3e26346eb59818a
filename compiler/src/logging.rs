//! Logging setup for the loop unroller
//!
//! The pass reports every rejected loop at `debug!` with a `LUA:` prefix, and
//! the stage-by-stage MIR dumps (the `trace` setting) also go out at `debug!`.
//! Utilities such as `mem2reg` and the interpreter log at `trace!`.
//!
//! ```bash
//! unroll -vv demo --trip 10 --trace                 # decisions and dumps
//! RUST_LOG=compiler::ir::mem2reg=trace unroll demo  # one module only
//! ```

use env_logger::{Builder, Env};
use log::LevelFilter;
use std::io::Write;
use std::sync::Once;

static INIT: Once = Once::new();

fn builder() -> Builder {
    let mut builder = Builder::new();
    builder.format(|buf, record| {
        writeln!(
            buf,
            "[{:5}] {} - {}",
            record.level(),
            record.target(),
            record.args()
        )
    });
    builder
}

/// Map a `-v` count to a level: 0 = warn, 1 = info, 2 = debug, 3+ = trace.
pub fn level_for_verbosity(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Level for a CLI run. Stage dumps need at least `debug`.
pub fn cli_level(verbose: u8, stage_dumps: bool) -> LevelFilter {
    let level = level_for_verbosity(verbose);
    if stage_dumps {
        level.max(LevelFilter::Debug)
    } else {
        level
    }
}

/// Initialize logging at a fixed level.
///
/// Records are printed as `[LEVEL] target - message`; multi-line messages
/// such as MIR dumps follow the prefix as-is. Only the first call has an effect.
pub fn init_with_level(level: LevelFilter) {
    INIT.call_once(|| {
        builder().filter_level(level).init();
    });
}

/// Initialize logging from `RUST_LOG`, falling back to `default` when unset.
pub fn init_from_env(default: LevelFilter) {
    INIT.call_once(|| {
        let env = Env::default().default_filter_or(default.as_str().to_lowercase());
        builder().parse_env(env).init();
    });
}

/// Initialize logging for tests. Quiet unless `RUST_LOG` asks otherwise.
pub fn init_test() {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or("warn"))
        .is_test(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_test();
        init_test();
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(level_for_verbosity(0), LevelFilter::Warn);
        assert_eq!(level_for_verbosity(2), LevelFilter::Debug);
        assert_eq!(level_for_verbosity(9), LevelFilter::Trace);
    }

    #[test]
    fn test_stage_dumps_raise_level() {
        assert_eq!(cli_level(0, true), LevelFilter::Debug);
        assert_eq!(cli_level(3, true), LevelFilter::Trace);
        assert_eq!(cli_level(1, false), LevelFilter::Info);
    }

    #[test]
    fn test_log_levels() {
        init_test();
        log::warn!("LUA: test warning");
        log::debug!("LUA: Can't unroll: loop is not a single block");
        log::trace!("LUA: test trace");
    }
}

use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Seeded stress driver for sql-pool")]
pub(crate) struct Args {
    #[arg(long, value_parser = humantime::parse_duration)]
    pub(crate) duration: Option<Duration>,
    /// Total operations across all tasks
    #[arg(long)]
    pub(crate) iterations: Option<u64>,
    #[arg(long)]
    pub(crate) seed: Option<u64>,
    #[arg(long, default_value_t = 4)]
    pub(crate) pool_size: usize,
    #[arg(long, default_value_t = 16)]
    pub(crate) tasks: usize,
    #[arg(long, default_value_t = 4)]
    pub(crate) workers: usize,
    #[arg(long, default_value_t = 0.3)]
    pub(crate) write_rate: f64,
    #[arg(long, default_value_t = 0.1)]
    pub(crate) hold_rate: f64,
    #[arg(long, default_value_t = 0.02)]
    pub(crate) break_rate: f64,
    #[arg(long, default_value_t = 0.05)]
    pub(crate) sleep_rate: f64,
    /// Database file; a temporary one is used when omitted
    #[arg(long)]
    pub(crate) db: Option<PathBuf>,
    #[arg(long)]
    pub(crate) log: Option<PathBuf>,
    #[arg(long)]
    pub(crate) quick: bool,
    #[arg(long)]
    pub(crate) stress: bool,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SimConfig {
    pub(crate) duration_ms: Option<u64>,
    pub(crate) iterations: Option<u64>,
    pub(crate) seed: u64,
    pub(crate) pool_size: usize,
    pub(crate) tasks: usize,
    pub(crate) workers: usize,
    pub(crate) write_rate: f64,
    pub(crate) hold_rate: f64,
    pub(crate) break_rate: f64,
    pub(crate) sleep_rate: f64,
    pub(crate) db: Option<PathBuf>,
    pub(crate) log: Option<PathBuf>,
    pub(crate) preset: Option<String>,
    pub(crate) first_steps: usize,
    pub(crate) tail_steps: usize,
}

impl SimConfig {
    pub(crate) fn from_args(args: Args) -> Self {
        let mut config = SimConfig {
            duration_ms: args
                .duration
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            iterations: args.iterations,
            seed: args.seed.unwrap_or_else(random_seed),
            pool_size: args.pool_size.max(1),
            tasks: args.tasks.max(1),
            workers: args.workers.max(1),
            write_rate: clamp_rate(args.write_rate),
            hold_rate: clamp_rate(args.hold_rate),
            break_rate: clamp_rate(args.break_rate),
            sleep_rate: clamp_rate(args.sleep_rate),
            db: args.db,
            log: args.log,
            preset: None,
            first_steps: 30,
            tail_steps: 80,
        };

        if args.quick {
            config.apply_quick();
        }
        if args.stress {
            config.apply_stress();
        }
        if config.iterations.is_none() && config.duration_ms.is_none() {
            config.iterations = Some(2_000);
        }

        config
    }

    fn apply_quick(&mut self) {
        self.preset = Some("quick".to_string());
        self.iterations = Some(1_000);
        self.duration_ms = None;
        self.pool_size = 2;
        self.tasks = 6;
        self.break_rate = 0.02;
        self.sleep_rate = 0.05;
    }

    fn apply_stress(&mut self) {
        self.preset = Some("stress".to_string());
        self.iterations = Some(50_000);
        self.duration_ms = None;
        self.pool_size = 8;
        self.tasks = 64;
        self.workers = 8;
        self.write_rate = 0.4;
        self.hold_rate = 0.15;
        self.break_rate = 0.03;
        self.sleep_rate = 0.08;
    }

    /// Operations each task runs before stopping.
    pub(crate) fn steps_per_task(&self) -> u64 {
        let tasks = u64::try_from(self.tasks).unwrap_or(u64::MAX);
        self.iterations
            .map_or(u64::MAX, |total| total.div_ceil(tasks.max(1)))
    }
}

fn clamp_rate(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn random_seed() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    now.as_secs() ^ u64::from(now.subsec_nanos())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_rate_limits_bounds() {
        assert_eq!(clamp_rate(-1.0), 0.0);
        assert_eq!(clamp_rate(2.0), 1.0);
        assert_eq!(clamp_rate(0.5), 0.5);
        assert_eq!(clamp_rate(f64::NAN), 0.0);
    }

    #[test]
    fn iterations_are_split_across_tasks() {
        let args = Args::parse_from(["simulator", "--iterations", "100", "--tasks", "8"]);
        let config = SimConfig::from_args(args);
        assert_eq!(config.steps_per_task(), 13);
    }

    #[test]
    fn quick_preset_overrides_sizes() {
        let args = Args::parse_from(["simulator", "--quick", "--pool-size", "9"]);
        let config = SimConfig::from_args(args);
        assert_eq!(config.pool_size, 2);
        assert_eq!(config.preset.as_deref(), Some("quick"));
    }
}

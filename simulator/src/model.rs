use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::args::SimConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    /// Borrow a connection and keep it across steps.
    Acquire,
    /// Query on the held connection, or through the façade when none is held.
    Read,
    /// Insert on the held connection, or through the façade when none is held.
    Write,
    /// Keep the held connection busy for a while.
    Hold(u64),
    /// Close the held connection's session so the next checkout must repair it.
    Break,
    Release,
    Sleep(u64),
}

#[derive(Debug, Clone)]
pub(crate) struct TaskState {
    pub(crate) id: usize,
    pub(crate) holding: bool,
    /// Steps since the current connection was acquired.
    pub(crate) held_for: u32,
}

/// Longest a task keeps a connection before it is forced to release it.
const MAX_HELD_STEPS: u32 = 8;

impl TaskState {
    pub(crate) fn new(id: usize) -> Self {
        Self {
            id,
            holding: false,
            held_for: 0,
        }
    }

    pub(crate) fn next_op(&self, config: &SimConfig, rng: &mut ChaCha8Rng) -> Op {
        if self.holding {
            if self.held_for >= MAX_HELD_STEPS {
                return Op::Release;
            }
            let weights = [
                (Op::Read, 0.35),
                (Op::Write, config.write_rate),
                (Op::Hold(rng.random_range(1..=20)), config.hold_rate),
                (Op::Break, config.break_rate),
                (Op::Release, 0.25),
            ];
            return choose_weighted(&weights, rng);
        }

        if rng.random::<f64>() < config.sleep_rate {
            return Op::Sleep(rng.random_range(1..=10));
        }
        let weights = [
            (Op::Acquire, 0.4),
            (Op::Read, 0.3),
            (Op::Write, config.write_rate),
        ];
        choose_weighted(&weights, rng)
    }
}

fn choose_weighted(items: &[(Op, f64)], rng: &mut ChaCha8Rng) -> Op {
    let total: f64 = items.iter().map(|(_, weight)| weight.max(0.0)).sum();
    if total <= f64::EPSILON {
        return items.first().map_or(Op::Sleep(1), |(op, _)| *op);
    }
    let mut target = rng.random::<f64>() * total;
    for (op, weight) in items {
        let w = weight.max(0.0);
        if target <= w {
            return *op;
        }
        target -= w;
    }
    items.last().map_or(Op::Sleep(1), |(op, _)| *op)
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use rand::SeedableRng;

    use super::*;
    use crate::args::Args;

    #[test]
    fn long_holders_are_forced_to_release() {
        let config = SimConfig::from_args(Args::parse_from(["simulator"]));
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let task = TaskState {
            id: 0,
            holding: true,
            held_for: MAX_HELD_STEPS,
        };
        assert_eq!(task.next_op(&config, &mut rng), Op::Release);
    }

    #[test]
    fn idle_tasks_never_pick_held_only_ops() {
        let config = SimConfig::from_args(Args::parse_from(["simulator"]));
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let task = TaskState::new(1);
        for _ in 0..500 {
            let op = task.next_op(&config, &mut rng);
            assert!(!matches!(op, Op::Hold(_) | Op::Break | Op::Release), "{op:?}");
        }
    }
}

// Copyright (c) 2025 RustyDB Contributors
//
// Level sampling: an injected dependency.
//
// The engine needs, per insert, a `topLevel` drawn from a geometric/binomial
// distribution with p = 0.5 over [0, max_level - 1]. The specification treats
// the source of randomness as an external collaborator rather than part of
// the core's responsibility, so it is expressed here as a trait the caller
// can substitute (deterministic tests, a shared RNG pool, whatever fits).

use rand::Rng;

/// Produces skiplist tower heights for newly-inserted nodes.
///
/// Implementations are called once per `insert`, with the thread's `tid` and
/// the queue's `max_level`. They must return a value in `[0, max_level - 1]`.
pub trait LevelSampler: Send + Sync {
    fn sample(&self, tid: usize, max_level: usize) -> usize;
}

/// True Binomial(`max_level - 1`, 0.5) sampler: the number of heads across
/// `max_level - 1` independent coin flips.
///
/// This matches `gsl_ran_binomial(rng, 0.5, max_level - 1)` in the original
/// implementation exactly, rather than approximating it: the distribution is
/// bell-shaped around `(max_level - 1) / 2`, not front-loaded toward 0 the
/// way a "count consecutive heads until the first tail" geometric draw would
/// be.
#[derive(Debug, Default)]
pub struct BinomialSampler;

impl LevelSampler for BinomialSampler {
    fn sample(&self, _tid: usize, max_level: usize) -> usize {
        if max_level <= 1 {
            return 0;
        }
        let cap = max_level - 1;
        let mut rng = rand::rng();
        (0..cap).filter(|_| rng.random_bool(0.5)).count()
    }
}

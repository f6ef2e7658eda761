//! Bounded worker pool
//!
//! Hashing and blob transfers fan out over scoped threads pulling from a shared
//! queue. Results come back in input order.

use parking_lot::Mutex;
use std::num::NonZeroUsize;

/// Upper bound on the default worker count.
pub const MAX_DEFAULT_WORKERS: usize = 8;

/// Worker count: `configured` when non-zero, otherwise available parallelism
/// capped at [`MAX_DEFAULT_WORKERS`].
pub fn worker_count(configured: Option<usize>) -> usize {
    match configured {
        Some(n) if n > 0 => n,
        _ => std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1)
            .min(MAX_DEFAULT_WORKERS),
    }
}

/// Applies `f` to every item on up to `workers` threads.
pub fn parallel_map<T, R, F>(items: Vec<T>, workers: usize, f: F) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync,
{
    let len = items.len();
    let workers = workers.max(1).min(len);
    if workers <= 1 {
        return items.into_iter().map(f).collect();
    }

    let queue = Mutex::new(items.into_iter().enumerate());
    let results: Mutex<Vec<Option<R>>> = Mutex::new((0..len).map(|_| None).collect());

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let next = queue.lock().next();
                let Some((index, item)) = next else {
                    break;
                };
                let result = f(item);
                results.lock()[index] = Some(result);
            });
        }
    });

    results.into_inner().into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_results_keep_input_order() {
        let items: Vec<u64> = (0..100).collect();
        let doubled = parallel_map(items, 4, |x| x * 2);
        assert_eq!(doubled, (0..100).map(|x| x * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_input() {
        let out: Vec<u32> = parallel_map(Vec::<u32>::new(), 4, |x| x);
        assert!(out.is_empty());
    }

    #[test]
    fn test_worker_count() {
        assert_eq!(worker_count(Some(3)), 3);
        let default = worker_count(None);
        assert!(default >= 1 && default <= MAX_DEFAULT_WORKERS);
        assert_eq!(worker_count(Some(0)), default);
    }
}

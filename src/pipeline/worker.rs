// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 有界工作线程池: 每个任务处理一个文件, 结果按提交顺序收集

use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::unbounded;
use tracing::{debug, warn};

use crate::error::{Result, TrackerError};

/// 运行全部任务, 返回值顺序与 `jobs` 一致
///
/// `worker_count <= 1` 时在调用线程中顺序执行。任一任务失败则不再领取新任务,
/// 返回提交顺序中最靠前的错误。
pub fn run_jobs<J, T, F>(jobs: Vec<J>, worker_count: usize, f: F) -> Result<Vec<T>>
where
    J: Send,
    T: Send,
    F: Fn(usize, J) -> Result<T> + Sync,
{
    if worker_count <= 1 || jobs.len() <= 1 {
        return jobs
            .into_iter()
            .enumerate()
            .map(|(index, job)| f(index, job))
            .collect();
    }

    let total = jobs.len();
    let workers = worker_count.min(total);
    let (job_tx, job_rx) = unbounded::<(usize, J)>();
    let (result_tx, result_rx) = unbounded::<(usize, Result<T>)>();
    for item in jobs.into_iter().enumerate() {
        // 接收端在作用域内存活, 发送不会失败
        let _ = job_tx.send(item);
    }
    drop(job_tx);

    let abort = AtomicBool::new(false);
    std::thread::scope(|scope| {
        for worker in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let abort = &abort;
            let f = &f;
            scope.spawn(move || {
                debug!("👷 worker {} 启动", worker);
                while let Ok((index, job)) = job_rx.recv() {
                    if abort.load(Ordering::Relaxed) {
                        break;
                    }
                    let result = f(index, job);
                    if result.is_err() {
                        abort.store(true, Ordering::Relaxed);
                    }
                    if result_tx.send((index, result)).is_err() {
                        break;
                    }
                }
                debug!("👷 worker {} 退出", worker);
            });
        }
    });
    drop(result_tx);

    let mut slots: Vec<Option<Result<T>>> = (0..total).map(|_| None).collect();
    for (index, result) in result_rx.try_iter() {
        slots[index] = Some(result);
    }

    // 提交顺序中最靠前的错误
    if let Some(pos) = slots.iter().position(|s| matches!(s, Some(Err(_)))) {
        if let Some(Err(e)) = slots.swap_remove(pos) {
            warn!("❌ 任务 {} 失败, 批处理中止", pos);
            return Err(e);
        }
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| match slot {
            Some(result) => result,
            None => Err(TrackerError::configuration(format!(
                "job {} did not produce a result",
                index
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_results_follow_submission_order() {
        let jobs: Vec<u64> = (0..20).collect();
        let results = run_jobs(jobs, 4, |_, j| {
            // 让较早的任务更慢, 打乱完成顺序
            std::thread::sleep(std::time::Duration::from_millis(20 - j));
            Ok(j * 10)
        })
        .unwrap();
        assert_eq!(results, (0..20).map(|j| j * 10).collect::<Vec<_>>());
    }

    #[test]
    fn test_sequential_and_parallel_agree() {
        let f = |i: usize, j: u32| Ok(format!("{}:{}", i, j * 3));
        let seq = run_jobs(vec![1, 2, 3, 4], 1, f).unwrap();
        let par = run_jobs(vec![1, 2, 3, 4], 3, f).unwrap();
        assert_eq!(seq, par);
    }

    #[test]
    fn test_failure_aborts_batch() {
        let result = run_jobs((0..8).collect::<Vec<u32>>(), 3, |_, j| {
            if j == 2 {
                Err(TrackerError::serialization("boom"))
            } else {
                Ok(j)
            }
        });
        assert!(matches!(result, Err(TrackerError::Serialization(_))));
    }

    #[test]
    fn test_earliest_failure_is_reported() {
        for workers in [1, 4] {
            let result = run_jobs((0..6).collect::<Vec<u32>>(), workers, |_, j| {
                if j >= 3 {
                    // 较晚的任务先失败
                    std::thread::sleep(std::time::Duration::from_millis(5 * (6 - j) as u64));
                    Err(TrackerError::configuration(format!("job {j}")))
                } else {
                    Ok(j)
                }
            });
            match result {
                Err(TrackerError::Configuration(message)) => assert_eq!(message, "job 3"),
                other => panic!("expected the job 3 failure, got {:?}", other),
            }
        }
    }
}

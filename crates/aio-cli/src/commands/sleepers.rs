// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! `aio sleepers`: one task per delay, printed in the order they wake.

use aio_rt::clock::delay_from_secs;
use aio_rt::{BoxError, RuntimeConfig, Scheduler};

use crate::output;

pub fn cmd_sleepers(config: &RuntimeConfig, delays: &[f64]) -> Result<(), BoxError> {
    let mut sched = Scheduler::from_config(config)?;
    let start = sched.handle().now();

    for &secs in delays {
        sched.new_task(move |cx| async move {
            cx.sleep(delay_from_secs(secs)).await;
            let slept = cx.handle().now().duration_since(start);
            println!(
                "{} {} asked {}s, woke after {}",
                output::status_pass(),
                output::task_id(cx.id()),
                secs,
                output::elapsed(slept)
            );
            Ok::<(), BoxError>(())
        });
    }

    sched.run()?;
    let stats = sched.stats();
    println!(
        "{}",
        output::banner_ok(&format!("{} sleepers, {} timers", stats.tasks_completed, stats.timers_fired))
    );
    Ok(())
}

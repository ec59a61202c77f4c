// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! `aio countdown`: one task counting down with a sleep between lines.

use std::time::Duration;

use aio_rt::{BoxError, RuntimeConfig, Scheduler};

use crate::output;

pub fn cmd_countdown(config: &RuntimeConfig, from: u32, interval: Duration) -> Result<(), BoxError> {
    let mut sched = Scheduler::from_config(config)?;

    sched.new_task(move |cx| async move {
        let mut counter = from;
        while counter > 0 {
            println!("{}{}", counter, ".".repeat(counter as usize));
            cx.sleep(interval).await;
            counter -= 1;
        }
        Ok::<(), BoxError>(())
    });

    sched.run()?;
    println!("{}", output::banner_ok("Countdown"));
    Ok(())
}

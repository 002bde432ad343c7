//! `cron` command — scheduling hints.

use anyhow::Result;

/// Print how scheduled jobs are managed. Programmatic cron lives in the
/// `cron` tool; jobs are in-memory and do not survive a restart.
pub async fn cmd_cron() -> Result<()> {
    println!("Scheduled jobs are managed by the running agent through the 'cron' tool:");
    println!();
    println!("  - ask the agent: \"remind me in 10 minutes to stretch\"");
    println!("  - ask the agent: \"every morning at 9, summarize my inbox\"");
    println!("  - ask the agent: \"list my scheduled jobs\" / \"remove job <id>\"");
    println!();
    println!("Jobs are held in memory by the gateway process; restarting drops them.");
    Ok(())
}

//! Plan command - dry-run capacity planning.

use anyhow::Result;

use usbforge::config::Config;
use usbforge::planner;

/// Execute the plan command. Touches no device.
pub fn cmd_plan(
    config: &Config,
    total_gb: f64,
    persistence_gb: Option<u64>,
    raw_image_gb: Option<u64>,
    min_free_gb: Option<u64>,
) -> Result<()> {
    let plan = planner::plan(
        total_gb,
        persistence_gb.unwrap_or(config.partition.kali_size_gb),
        raw_image_gb.or(config.partition.wtg_size_gb),
        min_free_gb.unwrap_or(config.partition.min_free_gb),
    )?;

    plan.print();
    println!();
    println!("Raw-image bound: {:.1} GB", plan.max_raw_image_gb);
    println!("Reserved for data partitions: {} MB", plan.reserved_tail_mb());
    for spec in &plan.partitions {
        println!(
            "  partition {}: {} {} label={} type={}",
            spec.index, spec.size, spec.filesystem, spec.label, spec.type_code
        );
    }
    Ok(())
}

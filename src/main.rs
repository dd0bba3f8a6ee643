use anyhow::{bail, Context, Result};
use log::*;

use memsim::{Allocator, BlockStatus, Strategy};

/// Region size used when none is given on the command line.
const DEFAULT_REGION_SIZE: u64 = 100;

struct Config {
    strategy: Strategy,
    region_size: u64,
}

impl Config {
    /// Read `memsim [STRATEGY] [TOTAL_SIZE]` from the command
    /// line.
    fn from_args() -> Result<Self> {
        let mut args = std::env::args().skip(1);

        let strategy = match args.next() {
            Some(name) => name.parse().context("Invalid strategy argument")?,
            None => Strategy::FirstFit,
        };
        let region_size = match args.next() {
            Some(size) => size
                .parse()
                .with_context(|| format!("Invalid region size: {size}"))?,
            None => DEFAULT_REGION_SIZE,
        };
        if args.next().is_some() {
            bail!("Usage: memsim [first_fit|next_fit|best_fit|worst_fit] [TOTAL_SIZE]");
        }

        Ok(Self { strategy, region_size })
    }
}

fn main() -> Result<()> {
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "info");
    }
    pretty_env_logger::init();

    let config = Config::from_args()?;
    let mut allocator = Allocator::new(config.region_size)?;
    info!("Simulating {} over {} units.", config.strategy, config.region_size);

    // Fill the region with processes of various sizes (given as
    // percentages of the region), leave holes by freeing every
    // other one, then place a second wave into the holes.
    let first_wave = [("P0", 10), ("P1", 25), ("P2", 5), ("P3", 20), ("P4", 15), ("P5", 30)];
    let second_wave = [("P6", 4), ("P7", 12), ("P8", 22), ("P9", 18)];

    run_wave(&mut allocator, config.strategy, &first_wave);
    print_memory_map(&allocator);

    for (process, _) in first_wave.iter().step_by(2) {
        match allocator.free(process) {
            Ok(()) => info!("Freed {process}."),
            Err(error) => warn!("{error}"),
        }
    }
    print_memory_map(&allocator);

    run_wave(&mut allocator, config.strategy, &second_wave);
    print_memory_map(&allocator);

    Ok(())
}

fn run_wave(allocator: &mut Allocator, strategy: Strategy, wave: &[(&str, u64)]) {
    for &(process, percent) in wave {
        let size = (allocator.total_size() * percent / 100).max(1);

        match allocator.allocate(process, size, strategy) {
            Ok(allocation) => info!("{process}: {size} units at offset {}.", allocation.offset),
            Err(error) => warn!("{process}: {error}"),
        }
    }
}

fn print_memory_map(allocator: &Allocator) {
    info!("{:<10} {:<10} {:<10} {:<10}", "Offset", "Size", "Status", "Process");
    for block in allocator.memory_map() {
        let status = match block.status {
            BlockStatus::Free => "free",
            BlockStatus::Allocated => "allocated",
        };
        let owner = block.owner.as_ref().map_or("-", |owner| owner.as_str());
        info!("{:<10} {:<10} {:<10} {:<10}", block.offset, block.size, status, owner);
    }
    info!(
        "{} of {} units allocated, largest free block {}, cursor at {}.",
        allocator.allocated(),
        allocator.total_size(),
        allocator.largest_free_block(),
        allocator.cursor(),
    );
}

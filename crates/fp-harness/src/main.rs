#![forbid(unsafe_code)]

use anyhow::{Context, Result, bail};
use fp_block::Bio;
use fp_core::PunchCtx;
use fp_harness::{MemDisk, RecordingHost, SimResolver, SimSourceBuilder};
use fp_types::Sector;
use std::env;
use std::sync::Arc;

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let cmd = args.first().map(String::as_str);

    match cmd {
        Some("demo") | None => {
            let json = args.iter().any(|arg| arg == "--json");
            demo(json)
        }
        Some("--help" | "-h" | "help") => {
            print_usage();
            Ok(())
        }
        Some(other) => {
            print_usage();
            bail!("unknown command: {other}")
        }
    }
}

fn print_usage() {
    println!("fp-harness\n");
    println!("USAGE:");
    println!("  fp-harness demo [--json]");
}

/// Drive the full pipeline against an in-memory volume: add a
/// fragmented file, push a boundary-straddling write through the
/// virtual device, read it back, and dump the device status.
fn demo(json: bool) -> Result<()> {
    // A 16 MiB simulated volume with the punched file fragmented into
    // two runs: clusters [0,10) live at volume cluster 100, clusters
    // [10,20) at volume cluster 500.
    let volume = Arc::new(MemDisk::new(16 * 1024 * 1024));
    let resolver = SimResolver::new();
    let path = resolver.register(
        SimSourceBuilder::new("/mnt/ntfs/disk.img", Arc::clone(&volume) as _)
            .run(0, 100, 10)
            .run(10, 500, 10)
            .build(),
    );

    let ctx = PunchCtx::new(Arc::new(RecordingHost::new()), Arc::new(resolver))
        .context("driver init")?;

    let consumed = ctx
        .write_add(&format!("{}\n", path.display()))
        .map_err(|err| anyhow::anyhow!("add failed: {err} (errno {})", err.to_errno()))?;
    println!("# wrote {consumed} bytes to the add node");
    print!("{}", ctx.read_add());

    let id = *ctx.device_ids().first().context("device id")?;
    let dev = ctx.device(id).context("device lookup")?;
    dev.open();

    // Sectors [64, 96) straddle the extent boundary at virtual sector 80.
    let payload: Vec<u8> = (0..32 * 512).map(|i| (i % 251) as u8).collect();
    dev.submit(Bio::write(Sector(64), &payload))
        .map_err(|err| anyhow::anyhow!("write failed: {err}"))?;

    let mut back = vec![0_u8; payload.len()];
    dev.submit(Bio::read(Sector(64), &mut back))
        .map_err(|err| anyhow::anyhow!("read failed: {err}"))?;
    anyhow::ensure!(back == payload, "read-back mismatch across the split");
    println!("# split write/read across the extent boundary verified");

    let status = ctx
        .device_status(id)
        .map_err(|err| anyhow::anyhow!("status failed: {err}"))?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&status).context("serialize status")?
        );
    } else {
        print!("{}", status.render());
    }

    dev.release();
    ctx.remove_device(id)
        .map_err(|err| anyhow::anyhow!("remove failed: {err}"))?;
    ctx.shutdown();
    println!("# device removed, driver shut down");
    Ok(())
}

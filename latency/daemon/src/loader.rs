//! Probe object loader
//!
//! Loads the prebuilt BPF object, scopes it to the target PID and attaches
//! the send-path kprobes and the context switch tracepoint. Links stay
//! attached for as long as the loader is alive.

use crate::types::kernel::constants::*;
use anyhow::{Context, Result};
use aya::{
    maps::{MapData, RingBuf},
    programs::{KProbe, RawTracePoint},
    Bpf, BpfLoader,
};
use log::info;
use std::path::PathBuf;

/// Probe program loader and manager
pub struct ProbeLoader {
    bpf: Bpf,
}

impl ProbeLoader {
    /// Load the probe object from file or embedded bytecode
    ///
    /// # Arguments
    ///
    /// * `path` - Optional path to the probe object. If None, uses embedded bytecode.
    /// * `target_pid` - Process whose sends are traced
    pub fn load(path: Option<PathBuf>, target_pid: u32) -> Result<Self> {
        info!("Loading probe object...");

        let data = if let Some(obj_path) = path {
            info!("Loading probe object from: {:?}", obj_path);
            std::fs::read(&obj_path)
                .with_context(|| format!("Failed to read probe object file: {:?}", obj_path))?
        } else {
            #[cfg(feature = "embedded")]
            {
                info!("Loading embedded probe object...");
                include_bytes!(concat!(
                    env!("CARGO_MANIFEST_DIR"),
                    "/../../target/bpf/schedlat.bpf.o"
                ))
                .to_vec()
            }
            #[cfg(not(feature = "embedded"))]
            {
                anyhow::bail!(
                    "No probe object provided. Use --ebpf-object or compile with 'embedded' feature"
                );
            }
        };

        let bpf = BpfLoader::new()
            .set_global(TARGET_PID_GLOBAL, &target_pid, true)
            .load(&data)
            .context("Failed to load probe object")?;

        info!("Probe object loaded, scoped to PID {}", target_pid);

        Ok(Self { bpf })
    }

    /// Attach the entry and return probes on `tcp_sendmsg`
    ///
    /// The return probe is recognised from its `kretprobe/` section.
    pub fn attach_kprobes(&mut self) -> Result<()> {
        info!("Attaching kprobes for send latency...");

        for prog_name in [PROG_TCP_SENDMSG_ENTRY, PROG_TCP_SENDMSG_RETURN] {
            let program: &mut KProbe = self
                .bpf
                .program_mut(prog_name)
                .with_context(|| format!("{prog_name} program not found in probe object"))?
                .try_into()
                .with_context(|| format!("Failed to get {prog_name} as KProbe"))?;
            program
                .load()
                .with_context(|| format!("Failed to load {prog_name}"))?;
            program
                .attach(TCP_SENDMSG_SYMBOL, 0)
                .with_context(|| format!("Failed to attach {prog_name}"))?;
            info!("  ✓ Attached {} to {}", prog_name, TCP_SENDMSG_SYMBOL);
        }

        Ok(())
    }

    /// Attach the raw `sched_switch` tracepoint
    pub fn attach_tracepoints(&mut self) -> Result<()> {
        info!("Attaching scheduler tracepoint...");

        let program: &mut RawTracePoint = self
            .bpf
            .program_mut(PROG_SCHED_SWITCH)
            .with_context(|| format!("{PROG_SCHED_SWITCH} program not found in probe object"))?
            .try_into()
            .with_context(|| format!("Failed to get {PROG_SCHED_SWITCH} as RawTracePoint"))?;
        program
            .load()
            .with_context(|| format!("Failed to load {PROG_SCHED_SWITCH}"))?;
        program
            .attach(SCHED_SWITCH_TRACEPOINT)
            .context("Failed to attach sched_switch raw tracepoint")?;
        info!("  ✓ Attached to raw tracepoint {}", SCHED_SWITCH_TRACEPOINT);

        Ok(())
    }

    /// Take the ring buffer carrying records to userspace
    pub fn take_ring_buf(&mut self) -> Result<RingBuf<MapData>> {
        let map = self
            .bpf
            .take_map(EVENTS_MAP)
            .with_context(|| format!("{EVENTS_MAP} map not found in probe object"))?;

        RingBuf::try_from(map).context("Failed to create RingBuf from events map")
    }
}

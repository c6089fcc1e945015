//! Real-time scheduling helpers for the control loops (Linux SCHED_FIFO /
//! CPU pinning / mlockall; other OSes best-effort memory locking only).

use crate::cli::{RtArgs, RtLock};

/// Apply the requested real-time setup once per process. Every step is
/// best-effort: failures downgrade to warnings so a move still runs, just
/// without the latency guarantees.
pub fn setup_rt_once(args: &RtArgs) {
    use std::sync::OnceLock;
    static RT_ONCE: OnceLock<()> = OnceLock::new();

    if !args.rt {
        return;
    }
    let lock = args.rt_lock.unwrap_or_else(RtLock::os_default);
    RT_ONCE.get_or_init(|| {
        match apply_mem_lock(lock) {
            Ok(()) => tracing::info!(?lock, "memory lock applied"),
            Err(e) => tracing::warn!(error = %e, "mlockall failed; continuing unlocked"),
        }
        #[cfg(target_os = "linux")]
        {
            if let Err(e) = apply_fifo_priority(args.rt_prio) {
                tracing::warn!(error = %e, "SCHED_FIFO not applied");
            }
            if let Err(e) = apply_affinity(args.rt_cpu.unwrap_or(0)) {
                tracing::warn!(error = %e, "CPU affinity not applied");
            }
        }
        #[cfg(not(target_os = "linux"))]
        tracing::warn!("SCHED_FIFO and affinity unavailable on this OS; only mlockall applied");
    });
}

fn apply_mem_lock(lock: RtLock) -> eyre::Result<()> {
    use libc::{MCL_CURRENT, MCL_FUTURE, mlockall};

    let flags = match lock {
        RtLock::None => return Ok(()),
        RtLock::Current => MCL_CURRENT,
        RtLock::All => MCL_CURRENT | MCL_FUTURE,
    };
    if unsafe { mlockall(flags) } == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    // All can fail on memlock limits where Current still fits.
    if matches!(lock, RtLock::All)
        && matches!(err.raw_os_error(), Some(c) if c == libc::EPERM || c == libc::ENOMEM)
        && unsafe { mlockall(MCL_CURRENT) } == 0
    {
        tracing::warn!("mlockall(all) rejected; fell back to current pages only");
        return Ok(());
    }
    Err(eyre::eyre!(
        "mlockall failed: {err}; hint: needs CAP_IPC_LOCK (or root) and sufficient 'ulimit -l'"
    ))
}

/// SCHED_FIFO at the requested priority, clamped to the system range.
#[cfg(target_os = "linux")]
fn apply_fifo_priority(prio: Option<i32>) -> eyre::Result<()> {
    use libc::{
        SCHED_FIFO, sched_get_priority_max, sched_get_priority_min, sched_param,
        sched_setscheduler,
    };

    let (min, max) = unsafe {
        let min = sched_get_priority_min(SCHED_FIFO);
        let max = sched_get_priority_max(SCHED_FIFO);
        if min < 0 || max < 0 { (1, 99) } else { (min, max) }
    };
    let param = sched_param {
        sched_priority: prio.unwrap_or(max).clamp(min, max),
    };
    if unsafe { sched_setscheduler(0, SCHED_FIFO, &param) } != 0 {
        let err = std::io::Error::last_os_error();
        return Err(eyre::eyre!(
            "sched_setscheduler failed: {err}; hint: needs CAP_SYS_NICE or root \
             (e.g. 'sudo setcap cap_sys_nice=ep' on the binary)"
        ));
    }
    Ok(())
}

/// Pin the process to `target` if the current affinity mask permits it.
#[cfg(target_os = "linux")]
fn apply_affinity(target: usize) -> eyre::Result<()> {
    use libc::{CPU_ISSET, CPU_SET, CPU_ZERO, cpu_set_t};

    const MAX_CPUSET_BITS: usize = std::mem::size_of::<cpu_set_t>() * 8;

    let online = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    if online < 1 {
        eyre::bail!("could not determine online CPU count");
    }
    if target as libc::c_long >= online {
        eyre::bail!("requested CPU {target} >= online {online}");
    }
    if target >= MAX_CPUSET_BITS {
        eyre::bail!("requested CPU {target} exceeds cpu_set_t capacity {MAX_CPUSET_BITS}");
    }

    let mut allowed: cpu_set_t = unsafe { std::mem::zeroed() };
    unsafe { CPU_ZERO(&mut allowed) };
    let rc = unsafe { libc::sched_getaffinity(0, std::mem::size_of::<cpu_set_t>(), &mut allowed) };
    if rc == 0 && !unsafe { CPU_ISSET(target, &allowed) } {
        eyre::bail!("CPU {target} not permitted by current affinity mask");
    }

    let mut desired: cpu_set_t = unsafe { std::mem::zeroed() };
    unsafe {
        CPU_ZERO(&mut desired);
        CPU_SET(target, &mut desired);
    }
    if unsafe { libc::sched_setaffinity(0, std::mem::size_of::<cpu_set_t>(), &desired) } != 0 {
        return Err(eyre::eyre!(std::io::Error::last_os_error()));
    }
    Ok(())
}

use super::{MetricsSource, SystemInfo};
use crate::metrics::{MetricKind, MetricSample, MetricSet, TopProcess};
use chrono::Local;
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct CpuTimes {
    busy: u64,
    total: u64,
}

#[derive(Clone)]
struct ProcessSample {
    total_ticks: u64, // utime + stime
    timestamp: Instant,
}

pub struct LinuxMetricsSource {
    proc_root: PathBuf,
    disk_path: PathBuf,
    clock_ticks: u64,
    battery_dir: Option<PathBuf>,
    temperature_inputs: Vec<PathBuf>,
    last_cpu: Mutex<CpuTimes>,
    process_samples: Mutex<HashMap<u32, ProcessSample>>,
}

impl LinuxMetricsSource {
    pub fn new() -> Self {
        Self::with_roots("/proc", "/sys", "/")
    }

    /// Sensors are discovered once here; hot-plugged batteries are not
    /// picked up until restart.
    pub fn with_roots(
        proc_root: impl Into<PathBuf>,
        sys_root: impl Into<PathBuf>,
        disk_path: impl Into<PathBuf>,
    ) -> Self {
        let sys_root = sys_root.into();
        let clock_ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) as u64 }.max(1);
        Self {
            proc_root: proc_root.into(),
            disk_path: disk_path.into(),
            clock_ticks,
            battery_dir: find_battery(&sys_root),
            temperature_inputs: find_temperature_inputs(&sys_root),
            last_cpu: Mutex::new(CpuTimes::default()),
            process_samples: Mutex::new(HashMap::new()),
        }
    }

    /// Utilization since the previous call; the first call reports the
    /// average since boot.
    fn cpu_percent(&self) -> Option<f64> {
        let content = fs::read_to_string(self.proc_root.join("stat")).ok()?;
        let current = parse_cpu_times(&content)?;
        let mut last = self.last_cpu.lock().unwrap_or_else(PoisonError::into_inner);
        let busy = current.busy.saturating_sub(last.busy);
        let total = current.total.saturating_sub(last.total);
        *last = current;
        if total == 0 {
            return Some(0.0);
        }
        Some(busy as f64 / total as f64 * 100.0)
    }

    fn memory_percent(&self) -> Option<f64> {
        let content = fs::read_to_string(self.proc_root.join("meminfo")).ok()?;
        parse_meminfo(&content)
    }

    fn disk_percent(&self) -> Option<f64> {
        let path = CString::new(self.disk_path.as_os_str().as_bytes()).ok()?;
        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        if unsafe { libc::statvfs(path.as_ptr(), &mut stat) } != 0 {
            return None;
        }
        let frsize = stat.f_frsize as f64;
        let total = stat.f_blocks as f64 * frsize;
        let free = stat.f_bfree as f64 * frsize;
        let avail = stat.f_bavail as f64 * frsize;
        // Same definition as `df`: reserved blocks count as neither used nor available.
        let used = total - free;
        let usable = used + avail;
        if usable <= 0.0 {
            return None;
        }
        Some(used / usable * 100.0)
    }

    fn battery_percent(&self) -> Option<f64> {
        let dir = self.battery_dir.as_ref()?;
        read_trimmed(&dir.join("capacity"))?.parse().ok()
    }

    fn temperature(&self) -> Option<f64> {
        let readings: Vec<f64> = self
            .temperature_inputs
            .iter()
            .filter_map(|p| read_trimmed(p)?.parse::<f64>().ok())
            .map(|millis| millis / 1000.0)
            .collect();
        if readings.is_empty() {
            return None;
        }
        Some(readings.iter().sum::<f64>() / readings.len() as f64)
    }

    /// Records the process's tick count and returns its usage since the
    /// previous sample. A process seen for the first time has no rate yet.
    fn sample_process(&self, pid: u32, now: Instant) -> Option<TopProcess> {
        let content = fs::read_to_string(self.proc_root.join(pid.to_string()).join("stat")).ok()?;
        let (name, total_ticks) = parse_process_stat(&content)?;

        let mut samples = self.process_samples.lock().unwrap_or_else(PoisonError::into_inner);
        let prev = samples.insert(pid, ProcessSample { total_ticks, timestamp: now })?;
        let tick_delta = total_ticks.saturating_sub(prev.total_ticks);
        let time_delta = now.duration_since(prev.timestamp).as_secs_f64();
        if time_delta <= 0.0 {
            return None;
        }
        let cpu_percent = (tick_delta as f64 / self.clock_ticks as f64) / time_delta * 100.0;
        Some(TopProcess { name, cpu_percent })
    }
}

impl Default for LinuxMetricsSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSource for LinuxMetricsSource {
    fn get_all_metrics(&self) -> MetricSet {
        let timestamp = Local::now().naive_local();
        let readings = [
            (MetricKind::Cpu, self.cpu_percent()),
            (MetricKind::Memory, self.memory_percent()),
            (MetricKind::Disk, self.disk_percent()),
            (MetricKind::Battery, self.battery_percent()),
            (MetricKind::Temperature, self.temperature()),
        ];
        let mut set = MetricSet::new();
        for (kind, value) in readings {
            set.insert(MetricSample { kind, value, timestamp });
        }
        set
    }

    fn has_battery(&self) -> bool {
        self.battery_dir.is_some()
    }

    fn has_temperature_sensor(&self) -> bool {
        !self.temperature_inputs.is_empty()
    }

    fn is_charging(&self) -> Option<bool> {
        let status = read_trimmed(&self.battery_dir.as_ref()?.join("status"))?;
        Some(status != "Discharging")
    }

    fn top_process(&self) -> Option<TopProcess> {
        let now = Instant::now();
        let pids: Vec<u32> = fs::read_dir(&self.proc_root)
            .ok()?
            .flatten()
            .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
            .collect();

        let top = pids
            .iter()
            .filter_map(|&pid| self.sample_process(pid, now))
            .max_by(|a, b| a.cpu_percent.total_cmp(&b.cpu_percent));

        // Forget processes that have exited
        self.process_samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|pid, _| pids.contains(pid));
        top
    }

    fn system_info(&self) -> SystemInfo {
        let cpu_count = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) }.max(1) as u32;
        let mut uts: libc::utsname = unsafe { std::mem::zeroed() };
        if unsafe { libc::uname(&mut uts) } != 0 {
            return SystemInfo {
                os: "unknown".to_string(),
                release: String::new(),
                machine: String::new(),
                cpu_count,
            };
        }
        SystemInfo {
            os: c_field(&uts.sysname),
            release: c_field(&uts.release),
            machine: c_field(&uts.machine),
            cpu_count,
        }
    }
}

fn c_field(buf: &[libc::c_char]) -> String {
    unsafe { CStr::from_ptr(buf.as_ptr()) }.to_string_lossy().into_owned()
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

fn sorted_entries(dir: &Path) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .map(|rd| rd.flatten().map(|e| e.path()).collect())
        .unwrap_or_default();
    entries.sort();
    entries
}

fn find_battery(sys_root: &Path) -> Option<PathBuf> {
    sorted_entries(&sys_root.join("class/power_supply"))
        .into_iter()
        .find(|dir| {
            read_trimmed(&dir.join("type")).as_deref() == Some("Battery") && dir.join("capacity").exists()
        })
}

/// Prefers the per-core `coretemp` sensors (averaged), then the first
/// thermal zone, then the first input of any hwmon chip.
fn find_temperature_inputs(sys_root: &Path) -> Vec<PathBuf> {
    let hwmons = sorted_entries(&sys_root.join("class/hwmon"));
    let temp_inputs = |dir: &Path| -> Vec<PathBuf> {
        sorted_entries(dir)
            .into_iter()
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("temp") && n.ends_with("_input"))
            })
            .collect()
    };

    if let Some(coretemp) = hwmons
        .iter()
        .find(|dir| read_trimmed(&dir.join("name")).as_deref() == Some("coretemp"))
    {
        let inputs = temp_inputs(coretemp.as_path());
        if !inputs.is_empty() {
            return inputs;
        }
    }

    if let Some(zone) = sorted_entries(&sys_root.join("class/thermal"))
        .into_iter()
        .map(|dir| dir.join("temp"))
        .find(|p| p.exists())
    {
        return vec![zone];
    }

    hwmons
        .iter()
        .find_map(|dir| temp_inputs(dir.as_path()).into_iter().next())
        .into_iter()
        .collect()
}

/// Aggregate line of `/proc/stat`. Guest time is already folded into user.
fn parse_cpu_times(stat: &str) -> Option<CpuTimes> {
    let line = stat.lines().find(|l| l.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .take(8)
        .filter_map(|f| f.parse().ok())
        .collect();
    if fields.len() < 4 {
        return None;
    }
    let total: u64 = fields.iter().sum();
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    Some(CpuTimes { busy: total - idle, total })
}

fn parse_meminfo(meminfo: &str) -> Option<f64> {
    let mut fields = HashMap::new();
    for line in meminfo.lines() {
        let mut parts = line.split_whitespace();
        if let (Some(key), Some(value)) = (parts.next(), parts.next()) {
            if let Ok(kb) = value.parse::<f64>() {
                fields.insert(key.trim_end_matches(':'), kb);
            }
        }
    }
    let total = *fields.get("MemTotal")?;
    if total <= 0.0 {
        return None;
    }
    let available = match fields.get("MemAvailable") {
        Some(&avail) => avail,
        None => ["MemFree", "Buffers", "Cached"].iter().filter_map(|k| fields.get(k)).sum(),
    };
    Some((total - available) / total * 100.0)
}

/// Returns `(comm, utime + stime)`. The command name may itself contain
/// spaces and parentheses, so split on the last `)`.
fn parse_process_stat(stat: &str) -> Option<(String, u64)> {
    let open = stat.find('(')?;
    let close = stat.rfind(')')?;
    let name = stat.get(open + 1..close)?.to_string();
    let rest: Vec<&str> = stat.get(close + 1..)?.split_whitespace().collect();
    // rest[0] is the state field; utime and stime follow at 11 and 12.
    let utime: u64 = rest.get(11)?.parse().ok()?;
    let stime: u64 = rest.get(12)?.parse().ok()?;
    Some((name, utime + stime))
}

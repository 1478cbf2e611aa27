// ==========================================
// 表格数据导入系统 - 内存余量探测
// ==========================================
// 职责: 批次开始前的可用内存下限检查
// 说明: 仅 Linux 提供读数（/proc/meminfo），其余平台返回 None，
//       调用方跳过检查
// ==========================================

/// 读取当前可用内存（MB）
#[cfg(target_os = "linux")]
pub fn available_memory_mb() -> Option<u64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    parse_meminfo_available_mb(&meminfo)
}

#[cfg(not(target_os = "linux"))]
pub fn available_memory_mb() -> Option<u64> {
    None
}

/// 从 /proc/meminfo 文本解析 MemAvailable（kB → MB）
#[cfg(target_os = "linux")]
fn parse_meminfo_available_mb(meminfo: &str) -> Option<u64> {
    for line in meminfo.lines() {
        if let Some(rest) = line.strip_prefix("MemAvailable:") {
            let kb: u64 = rest
                .trim()
                .trim_end_matches("kB")
                .trim()
                .parse()
                .ok()?;
            return Some(kb / 1024);
        }
    }
    None
}

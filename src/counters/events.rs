//! Symbolic names for perf event types and configs.
//!
//! Counter configs in screen definitions are written with these names
//! (e.g. `PERF_COUNT_HW_CACHE_LL | (PERF_COUNT_HW_CACHE_RESULT_MISS < 16)`)
//! and resolved by the config evaluator.

pub const PERF_TYPE_HARDWARE: u32 = 0;
pub const PERF_TYPE_SOFTWARE: u32 = 1;
pub const PERF_TYPE_TRACEPOINT: u32 = 2;
pub const PERF_TYPE_HW_CACHE: u32 = 3;
pub const PERF_TYPE_RAW: u32 = 4;
pub const PERF_TYPE_BREAKPOINT: u32 = 5;

const TYPES: &[(&str, u32)] = &[
    ("PERF_TYPE_HARDWARE", PERF_TYPE_HARDWARE),
    ("PERF_TYPE_SOFTWARE", PERF_TYPE_SOFTWARE),
    ("PERF_TYPE_TRACEPOINT", PERF_TYPE_TRACEPOINT),
    ("PERF_TYPE_HW_CACHE", PERF_TYPE_HW_CACHE),
    ("PERF_TYPE_RAW", PERF_TYPE_RAW),
    ("PERF_TYPE_BREAKPOINT", PERF_TYPE_BREAKPOINT),
    ("HARDWARE", PERF_TYPE_HARDWARE),
    ("SOFTWARE", PERF_TYPE_SOFTWARE),
    ("TRACEPOINT", PERF_TYPE_TRACEPOINT),
    ("HW_CACHE", PERF_TYPE_HW_CACHE),
    ("RAW", PERF_TYPE_RAW),
    ("BREAKPOINT", PERF_TYPE_BREAKPOINT),
    ("HW", PERF_TYPE_HARDWARE),
    ("SW", PERF_TYPE_SOFTWARE),
];

const HARDWARE: &[(&str, u64)] = &[
    ("PERF_COUNT_HW_CPU_CYCLES", 0),
    ("PERF_COUNT_HW_INSTRUCTIONS", 1),
    ("PERF_COUNT_HW_CACHE_REFERENCES", 2),
    ("PERF_COUNT_HW_CACHE_MISSES", 3),
    ("PERF_COUNT_HW_BRANCH_INSTRUCTIONS", 4),
    ("PERF_COUNT_HW_BRANCH_MISSES", 5),
    ("PERF_COUNT_HW_BUS_CYCLES", 6),
    ("PERF_COUNT_HW_STALLED_CYCLES_FRONTEND", 7),
    ("PERF_COUNT_HW_STALLED_CYCLES_BACKEND", 8),
    ("PERF_COUNT_HW_REF_CPU_CYCLES", 9),
    ("CPU_CYCLES", 0),
    ("INSTRUCTIONS", 1),
    ("CACHE_REFERENCES", 2),
    ("CACHE_MISSES", 3),
    ("BRANCH_INSTRUCTIONS", 4),
    ("BRANCH_MISSES", 5),
    ("BUS_CYCLES", 6),
    ("STALLED_CYCLES_FRONTEND", 7),
    ("STALLED_CYCLES_BACKEND", 8),
    ("REF_CPU_CYCLES", 9),
];

const SOFTWARE: &[(&str, u64)] = &[
    ("PERF_COUNT_SW_CPU_CLOCK", 0),
    ("PERF_COUNT_SW_TASK_CLOCK", 1),
    ("PERF_COUNT_SW_PAGE_FAULTS", 2),
    ("PERF_COUNT_SW_CONTEXT_SWITCHES", 3),
    ("PERF_COUNT_SW_CPU_MIGRATIONS", 4),
    ("PERF_COUNT_SW_PAGE_FAULTS_MIN", 5),
    ("PERF_COUNT_SW_PAGE_FAULTS_MAJ", 6),
    ("PERF_COUNT_SW_ALIGNMENT_FAULTS", 7),
    ("PERF_COUNT_SW_EMULATION_FAULTS", 8),
];

const HW_CACHE: &[(&str, u64)] = &[
    ("PERF_COUNT_HW_CACHE_L1D", 0),
    ("PERF_COUNT_HW_CACHE_L1I", 1),
    ("PERF_COUNT_HW_CACHE_LL", 2),
    ("PERF_COUNT_HW_CACHE_DTLB", 3),
    ("PERF_COUNT_HW_CACHE_ITLB", 4),
    ("PERF_COUNT_HW_CACHE_BPU", 5),
    ("PERF_COUNT_HW_CACHE_NODE", 6),
    ("PERF_COUNT_HW_CACHE_OP_READ", 0),
    ("PERF_COUNT_HW_CACHE_OP_WRITE", 1),
    ("PERF_COUNT_HW_CACHE_OP_PREFETCH", 2),
    ("PERF_COUNT_HW_CACHE_RESULT_ACCESS", 0),
    ("PERF_COUNT_HW_CACHE_RESULT_MISS", 1),
];

/// Intel raw event codes (umask << 8 | event) used by the built-in screens.
const INTEL_RAW: &[(&str, u64)] = &[
    ("FP_COMP_OPS_EXE_X87", 0x0110),
    ("FP_COMP_OPS_EXE_SSE_SINGLE_PRECISION", 0x4010),
    ("FP_COMP_OPS_EXE_SSE_DOUBLE_PRECISION", 0x8010),
    ("FP_ASSIST_1", 0x1eca),
    ("FP_ASSIST_2", 0x01f7),
    ("FP_ASSIST_3", 0x0011),
    ("FP_ASSIST_4", 0x0111),
    ("MEM_INST_RETIRED_LOADS", 0x010b),
    ("MEM_INST_RETIRED_STORES", 0x020b),
    ("BR_INST_RETIRED_ALL_BRANCHES", 0x00c4),
    ("BR_MISP_RETIRED_ALL_BRANCHES", 0x00c5),
    ("BR_MISP_EXEC_ANY", 0x7f89),
    ("INST_RETIRED_X87", 0x02c0),
    ("ICACHE_MISSES_1", 0x0280),
    ("L1I_MISSES", 0x0081),
    ("ICACHE_MISSES_2", 0x0081),
    ("L2_RQSTS_LD_MISS", 0x0224),
    ("L2_RQSTS_IFETCH_MISS", 0x2024),
    ("L2_RQSTS_CODE_RD_MISS", 0x2024),
    ("UOPS_RETIRED_ALL_1", 0x01c2),
    ("UOPS_RETIRED_MACRO_FUSED", 0x04c2),
    ("UOPS_RETIRED_FUSED", 0x07c2),
    ("UOPS_RETIRED_ALL_2", 0x0fc2),
];

const SYMBOL_TABLES: &[&[(&str, u64)]] = &[HARDWARE, SOFTWARE, HW_CACHE, INTEL_RAW];

/// Resolves a symbolic event name used in a counter config.
pub fn config_code(name: &str) -> Option<u64> {
    SYMBOL_TABLES
        .iter()
        .flat_map(|table| table.iter())
        .find(|(n, _)| *n == name)
        .map(|(_, v)| *v)
}

/// Canonical symbolic name for `config` under event type `kind`.
pub fn config_name(kind: u32, config: u64) -> Option<&'static str> {
    let table = match kind {
        PERF_TYPE_HARDWARE => HARDWARE,
        PERF_TYPE_SOFTWARE => SOFTWARE,
        PERF_TYPE_RAW => INTEL_RAW,
        _ => return None,
    };
    table.iter().find(|(_, v)| *v == config).map(|(n, _)| *n)
}

/// Resolves an event type given by name or as a decimal number.
pub fn type_code(name: &str) -> Option<u32> {
    let name = name.trim();
    if let Ok(v) = name.parse::<u32>() {
        return Some(v);
    }
    TYPES.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
}

/// Canonical name of an event type.
pub fn type_name(kind: u32) -> Option<&'static str> {
    TYPES.iter().find(|(_, v)| *v == kind).map(|(n, _)| *n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_code_lookup() {
        assert_eq!(config_code("PERF_COUNT_HW_INSTRUCTIONS"), Some(1));
        assert_eq!(config_code("BRANCH_MISSES"), Some(5));
        assert_eq!(config_code("PERF_COUNT_HW_CACHE_RESULT_MISS"), Some(1));
        assert_eq!(config_code("UOPS_RETIRED_FUSED"), Some(0x07c2));
        assert_eq!(config_code("NOT_AN_EVENT"), None);
    }

    #[test]
    fn test_config_name_is_type_aware() {
        assert_eq!(
            config_name(PERF_TYPE_HARDWARE, 1),
            Some("PERF_COUNT_HW_INSTRUCTIONS")
        );
        assert_eq!(
            config_name(PERF_TYPE_SOFTWARE, 1),
            Some("PERF_COUNT_SW_TASK_CLOCK")
        );
        assert_eq!(config_name(PERF_TYPE_RAW, 0x00c4), Some("BR_INST_RETIRED_ALL_BRANCHES"));
        assert_eq!(config_name(PERF_TYPE_HW_CACHE, 0), None);
    }

    #[test]
    fn test_type_lookup() {
        assert_eq!(type_code("PERF_TYPE_RAW"), Some(PERF_TYPE_RAW));
        assert_eq!(type_code("HW_CACHE"), Some(PERF_TYPE_HW_CACHE));
        assert_eq!(type_code("4"), Some(4));
        assert_eq!(type_code("bogus"), None);
        assert_eq!(type_name(PERF_TYPE_SOFTWARE), Some("PERF_TYPE_SOFTWARE"));
    }
}

//! Screens available without any configuration.
//!
//! `default` and `branch prediction` only use generic hardware events. The
//! others use Intel raw events, listed per display model following the
//! tables of the Intel SDM (A-2: Sandy Bridge, A-4: Nehalem, A-6: Westmere).

use super::def::{ColumnDef, CounterDef, ScreenDef};

const TABLE_A2: &[&str] = &["06_2a"];
const TABLE_A4: &[&str] = &["06_1a", "06_1e", "06_1f", "06_2e"];
const TABLE_A6: &[&str] = &["06_25", "06_2c"];

fn models(tables: &[&[&str]]) -> Vec<String> {
    tables
        .iter()
        .flat_map(|t| t.iter())
        .map(|m| m.to_string())
        .collect()
}

fn hw(alias: &str, config: &str) -> CounterDef {
    CounterDef::new(alias, "PERF_TYPE_HARDWARE", config)
}

fn raw(alias: &str, config: &str) -> CounterDef {
    CounterDef::new(alias, "PERF_TYPE_RAW", config)
}

fn col(header: &str, format: &str, expr: &str, desc: &str) -> ColumnDef {
    ColumnDef::new(header, format, expr, desc)
}

fn cpu_column() -> ColumnDef {
    col(" %CPU", "%5.1f", "CPU_TOT", "CPU usage")
}

fn sys_column() -> ColumnDef {
    col(" %SYS", "%5.1f", "CPU_SYS", "CPU usage in kernel mode")
}

fn intel_screen(name: &str, tables: &[&[&str]]) -> ScreenDef {
    ScreenDef {
        name: name.to_string(),
        arch: Some("x86".to_string()),
        models: models(tables),
        ..Default::default()
    }
}

fn default_screen() -> ScreenDef {
    ScreenDef {
        name: "default".to_string(),
        desc: Some("Generic hardware events".to_string()),
        counters: vec![
            hw("CYCLE", "PERF_COUNT_HW_CPU_CYCLES"),
            hw("INSN", "PERF_COUNT_HW_INSTRUCTIONS"),
            hw("MISS", "PERF_COUNT_HW_CACHE_MISSES"),
            hw("BR", "PERF_COUNT_HW_BRANCH_MISSES"),
            hw("BUS", "PERF_COUNT_HW_BUS_CYCLES"),
        ],
        columns: vec![
            cpu_column(),
            sys_column(),
            col(" P", "%2d", "PROC_ID", "Processor last run on"),
            col("  Mcycle", "%8.2f", "delta(CYCLE)/1000000", "Cycles (millions)"),
            col("  Minstr", "%8.2f", "delta(INSN)/1000000", "Instructions (millions)"),
            col(
                " IPC",
                "%4.2f",
                "delta(INSN)/delta(CYCLE)",
                "Executed instructions per cycle",
            ),
            col(
                " %MISS",
                "%6.2f",
                "100*delta(MISS)/delta(INSN)",
                "Cache miss per instruction",
            ),
            col(
                " %BMIS",
                "%6.2f",
                "100*delta(BR)/delta(INSN)",
                "Branch misprediction per instruction",
            ),
            col(
                " %BUS",
                "%5.1f",
                "delta(BUS)/delta(INSN)",
                "Bus cycles per executed instruction",
            ),
        ],
        ..Default::default()
    }
}

fn branch_prediction_screen() -> ScreenDef {
    ScreenDef {
        name: "branch prediction".to_string(),
        counters: vec![
            hw("INSN", "PERF_COUNT_HW_INSTRUCTIONS"),
            hw("BR", "PERF_COUNT_HW_BRANCH_INSTRUCTIONS"),
            hw("MISP", "PERF_COUNT_HW_BRANCH_MISSES"),
        ],
        columns: vec![
            cpu_column(),
            col(
                "  %MISP",
                "  %5.2f",
                "100*delta(MISP)/delta(BR)",
                "Mispredictions per 100 branch instructions",
            ),
            col(
                "  %MIS/I ",
                "   %5.2f ",
                "100*delta(MISP)/delta(INSN)",
                "Mispredictions per 100 instructions",
            ),
            col(
                "%BR/I",
                " %4.1f",
                "100*delta(BR)/delta(INSN)",
                "Fraction of branch instructions",
            ),
        ],
        ..Default::default()
    }
}

fn floating_point_screen() -> ScreenDef {
    let mut s = intel_screen("floating point", &[TABLE_A2, TABLE_A4, TABLE_A6]);
    s.counters = vec![
        hw("CYCLE", "PERF_COUNT_HW_CPU_CYCLES"),
        hw("INSN", "PERF_COUNT_HW_INSTRUCTIONS"),
        raw("X87", "FP_COMP_OPS_EXE_X87"),
        raw("SSES", "FP_COMP_OPS_EXE_SSE_SINGLE_PRECISION"),
        raw("SSED", "FP_COMP_OPS_EXE_SSE_DOUBLE_PRECISION"),
        raw("ASSIST", "FP_ASSIST_1").on_models(TABLE_A2),
        raw("ASSIST", "FP_ASSIST_2").on_models(&[TABLE_A4, TABLE_A6].concat()),
    ];
    s.columns = vec![
        cpu_column(),
        col("  Mcycle", "%8.2f", "delta(CYCLE)/1000000", "Cycles (millions)"),
        col("  Minstr", "%8.2f", "delta(INSN)/1000000", "Instructions (millions)"),
        col(
            " IPC",
            "%4.2f",
            "delta(INSN)/delta(CYCLE)",
            "Executed instructions per cycle",
        ),
        col(
            " %x87",
            "%5.1f",
            "100*delta(X87)/delta(INSN)",
            "FP computational uops (FP_COMP_OPS_EXE.X87) per insn",
        ),
        col(
            "%SSES",
            "%5.1f",
            "100*delta(SSES)/delta(INSN)",
            "SSE* FP single precision uops per insn",
        ),
        col(
            "%SSED",
            "%5.1f",
            "100*delta(SSED)/delta(INSN)",
            "SSE* FP double precision uops per insn",
        ),
        col(
            "%assist",
            "  %5.1f",
            "100*delta(ASSIST)/delta(INSN)",
            "FP op that required micro-code assist per instruction",
        ),
    ];
    s
}

fn instruction_mix_screen() -> ScreenDef {
    let mut s = intel_screen("instruction mix", &[TABLE_A4, TABLE_A6]);
    s.counters = vec![
        hw("CYCLE", "PERF_COUNT_HW_CPU_CYCLES"),
        hw("INSN", "PERF_COUNT_HW_INSTRUCTIONS"),
        raw("LD", "MEM_INST_RETIRED_LOADS"),
        raw("ST", "MEM_INST_RETIRED_STORES"),
        raw("X87", "INST_RETIRED_X87"),
        raw("BR", "BR_INST_RETIRED_ALL_BRANCHES"),
    ];
    s.columns = vec![
        cpu_column(),
        col("  Mcycle", "%8.2f", "delta(CYCLE)/1000000", "Cycles (millions)"),
        col("  Minstr", "%8.2f", "delta(INSN)/1000000", "Instructions (millions)"),
        col(
            " IPC",
            "%4.2f",
            "delta(INSN)/delta(CYCLE)",
            "Executed instructions per cycle",
        ),
        col("%LD/I", " %4.1f", "100*delta(LD)/delta(INSN)", "Fraction of loads"),
        col("%ST/I", " %4.1f", "100*delta(ST)/delta(INSN)", "Fraction of stores"),
        col("%FP/I", " %4.1f", "100*delta(X87)/delta(INSN)", "Fraction of x87"),
        col(
            "%BR/I",
            " %4.1f",
            "100*delta(BR)/delta(INSN)",
            "Fraction of branch instructions",
        ),
    ];
    s
}

fn memory_hierarchy_screen() -> ScreenDef {
    let a4_a6 = [TABLE_A4, TABLE_A6].concat();
    let mut s = intel_screen("memory hierarchy", &[TABLE_A2, TABLE_A4, TABLE_A6]);
    s.counters = vec![
        hw("INSN", "PERF_COUNT_HW_INSTRUCTIONS"),
        raw("L1I", "ICACHE_MISSES_1").on_models(TABLE_A2),
        raw("L1I", "L1I_MISSES").on_models(&a4_a6),
        raw("L2I", "L2_RQSTS_CODE_RD_MISS").on_models(TABLE_A2),
        raw("L2I", "L2_RQSTS_IFETCH_MISS").on_models(&a4_a6),
        // no L2 data miss event in table A-2
        raw("L2D", "L2_RQSTS_LD_MISS").on_models(&a4_a6),
        hw("L3", "PERF_COUNT_HW_CACHE_MISSES"),
    ];
    s.columns = vec![
        cpu_column(),
        col(
            " miss L1I",
            "%9lu",
            "delta(L1I)",
            "Instruction fetches that miss in L1I (L1I.MISSES)",
        ),
        col(" L1I", "%4.1f", "100*delta(L1I)/delta(INSN)", "   same, per instruction"),
        col(
            " miss L2I",
            "%9lu",
            "delta(L2I)",
            "Insn fetches that miss L2 cache (L2_RQSTS.IFETCH_MISS)",
        ),
        col(" L2I", "%4.1f", "100*delta(L2I)/delta(INSN)", "   same, per instruction"),
        col(" miss L2D", "%9lu", "delta(L2D)", "Loads that miss L2 cache"),
        col(" L2D", "%4.1f", "100*delta(L2D)/delta(INSN)", "   same, per instruction"),
        col("   miss L3", " %9lu", "delta(L3)", "LLC Misses"),
        col("   L3", " %4.1f", "100*delta(L3)/delta(INSN)", "   same, per instruction"),
    ];
    s
}

fn branch_instructions_screen() -> ScreenDef {
    let mut s = intel_screen("branch instructions", &[TABLE_A2, TABLE_A4, TABLE_A6]);
    s.counters = vec![
        hw("INSN", "PERF_COUNT_HW_INSTRUCTIONS"),
        raw("BR", "BR_INST_RETIRED_ALL_BRANCHES"),
        hw("MISP", "PERF_COUNT_HW_BRANCH_MISSES"),
    ];
    s.columns = vec![
        cpu_column(),
        col(
            " %MISP",
            " %5.2f",
            "100*delta(MISP)/delta(BR)",
            "Mispredictions per 100 branch instructions",
        ),
        col(
            " %MIS/I",
            "  %5.2f",
            "100*delta(MISP)/delta(INSN)",
            "Mispredictions per 100 instructions",
        ),
    ];
    s
}

fn micro_operations_screen() -> ScreenDef {
    let mut s = intel_screen("micro operations", &[TABLE_A2, TABLE_A4, TABLE_A6]);
    s.counters = vec![
        hw("CYCLE", "PERF_COUNT_HW_CPU_CYCLES"),
        hw("INSN", "PERF_COUNT_HW_INSTRUCTIONS"),
        raw("UOP", "UOPS_RETIRED_ALL_1"),
        raw("MACROF", "UOPS_RETIRED_MACRO_FUSED").on_models(&[TABLE_A4, TABLE_A6].concat()),
    ];
    s.columns = vec![
        cpu_column(),
        sys_column(),
        col("  Mcycle", "%8.2f", "delta(CYCLE)/1000000", "Cycles (millions)"),
        col("   Muops", "%8.2f", "delta(UOP)/1000000", "Retired uops (millions)"),
        col(
            "  Minstr",
            "%8.2f",
            "delta(INSN)/1000000",
            "Retired instructions (millions)",
        ),
        col(
            "  IPC",
            " %4.2f",
            "delta(INSN)/delta(CYCLE)",
            "Retired instructions per cycle",
        ),
        col(
            "  uPI",
            " %4.2f",
            "delta(UOP)/delta(INSN)",
            "Retired uops per instruction",
        ),
        col(
            " macrof",
            "   %4.2f",
            "delta(MACROF)/delta(INSN)",
            "Macro fused uops (UOPS_RETIRED.MACRO_FUSED) per instruction",
        ),
    ];
    s
}

/// All built-in screens, in catalog order. Screens and counters carry their
/// CPU targets; the catalog skips those that do not apply.
pub fn builtin_screens() -> Vec<ScreenDef> {
    vec![
        default_screen(),
        branch_prediction_screen(),
        micro_operations_screen(),
        floating_point_screen(),
        memory_hierarchy_screen(),
        branch_instructions_screen(),
        instruction_mix_screen(),
    ]
}

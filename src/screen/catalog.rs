//! Ordered collection of compiled screens.

use super::builtin::builtin_screens;
use super::def::ScreenDef;
use super::target::{CpuInfo, HOST_CPU};
use super::{Screen, ScreenError};
use std::ops::Index;
use tracing::{debug, warn};

/// Screens selectable by index, built-ins first.
#[derive(Debug, Clone)]
pub struct ScreenCatalog {
    cpu: CpuInfo,
    screens: Vec<Screen>,
    diagnostics: Vec<ScreenError>,
}

impl Default for ScreenCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl ScreenCatalog {
    /// Empty catalog for the running machine.
    pub fn new() -> Self {
        Self::for_cpu(HOST_CPU.clone())
    }

    pub fn for_cpu(cpu: CpuInfo) -> Self {
        Self {
            cpu,
            screens: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Catalog holding the built-in screens that apply to the running CPU.
    pub fn with_builtins() -> Self {
        Self::with_builtins_for(HOST_CPU.clone())
    }

    pub fn with_builtins_for(cpu: CpuInfo) -> Self {
        let mut catalog = Self::for_cpu(cpu);
        for def in builtin_screens() {
            catalog.add_definition(&def);
        }
        catalog
    }

    /// Compiles `def` and appends it. Offending counters and columns are
    /// dropped and kept as diagnostics. Returns the new screen's index, or
    /// `None` when the screen does not apply to this CPU.
    pub fn add_definition(&mut self, def: &ScreenDef) -> Option<usize> {
        if !def.target().matches(&self.cpu) {
            debug!("Screen '{}' does not apply to this CPU, skipped", def.name);
            return None;
        }

        let mut screen = Screen::for_cpu(&def.name, def.desc.as_deref(), self.cpu.clone());
        for counter in &def.counters {
            let target = counter.target();
            let target = (!target.is_unrestricted()).then_some(&target);
            if let Err(e) = screen.add_counter(&counter.alias, &counter.config, &counter.kind, target)
            {
                self.report(e);
            }
        }
        for column in &def.columns {
            if let Err(e) = screen.add_column(
                &column.header,
                &column.format,
                column.desc.as_deref(),
                &column.expr,
            ) {
                self.report(e);
            }
        }
        let pruned = screen.prune_unused();
        if pruned > 0 {
            debug!("Screen '{}': {} unused counter(s) dropped", def.name, pruned);
        }

        self.screens.push(screen);
        Some(self.screens.len() - 1)
    }

    fn report(&mut self, error: ScreenError) {
        match error {
            ScreenError::CounterNotAvailable { .. } => debug!("{}", error),
            _ => warn!("{}", error),
        }
        self.diagnostics.push(error);
    }

    pub fn get(&self, index: usize) -> Option<&Screen> {
        self.screens.get(index)
    }

    pub fn len(&self) -> usize {
        self.screens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.screens.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Screen> {
        self.screens.iter()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.screens.iter().position(|s| s.name() == name)
    }

    /// Everything rejected while compiling definitions.
    pub fn diagnostics(&self) -> &[ScreenError] {
        &self.diagnostics
    }

    /// `index: name` lines, as printed by `list-screens`.
    pub fn list_screens(&self) -> String {
        let mut out = String::from("Available screens:\n");
        for (i, screen) in self.screens.iter().enumerate() {
            out.push_str(&format!("{:2}: {}\n", i, screen.name()));
        }
        out
    }

    /// Definitions reproducing every screen, for export.
    pub fn definitions(&self) -> Vec<ScreenDef> {
        self.screens.iter().map(Screen::to_def).collect()
    }
}

impl Index<usize> for ScreenCatalog {
    type Output = Screen;

    fn index(&self, index: usize) -> &Screen {
        &self.screens[index]
    }
}

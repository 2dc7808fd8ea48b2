// cvar.rs — dynamic variable tracking

use std::collections::HashMap;
use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::Mutex;

use crate::console::con_printf;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CvarFlags: u32 {
        /// Saved to the config file by `write_variables`.
        const ARCHIVE = 1 << 0;
        /// Cannot be changed through `set` (only `force_set`).
        const NOSET = 1 << 1;
    }
}

/// A console variable.
#[derive(Debug, Clone)]
pub struct Cvar {
    pub name: String,
    pub string: String,
    pub flags: CvarFlags,
    pub modified: bool,
    pub value: f32,
}

/// Shared handle to a cvar table; subsystems that read configuration at
/// runtime hold one of these.
pub type SharedCvars = Arc<Mutex<CvarContext>>;

/// The cvar system context.
pub struct CvarContext {
    vars: Vec<Cvar>,
    /// O(1) cvar lookup by name -> index in vars
    index: HashMap<String, usize>,
}

impl CvarContext {
    pub fn new() -> Self {
        Self {
            vars: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Wrap a fresh context in the shared handle form.
    pub fn shared() -> SharedCvars {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Find a cvar by name. O(1) via HashMap.
    pub fn find_var(&self, name: &str) -> Option<&Cvar> {
        self.index.get(name).map(|&idx| &self.vars[idx])
    }

    /// Get the floating-point value of a cvar. Returns 0 if not found.
    pub fn variable_value(&self, name: &str) -> f32 {
        match self.find_var(name) {
            Some(var) => var.value,
            None => 0.0,
        }
    }

    /// Get the string value of a cvar. Returns "" if not found.
    pub fn variable_string(&self, name: &str) -> &str {
        match self.find_var(name) {
            Some(var) => &var.string,
            None => "",
        }
    }

    /// Get or create a cvar. If it already exists, the value is not
    /// changed but flags are OR'd in. Returns the index.
    pub fn get(&mut self, name: &str, value: &str, flags: CvarFlags) -> usize {
        if let Some(&idx) = self.index.get(name) {
            self.vars[idx].flags |= flags;
            return idx;
        }

        let idx = self.vars.len();
        self.vars.push(Cvar {
            name: name.to_string(),
            string: value.to_string(),
            flags,
            modified: true,
            value: value.parse::<f32>().unwrap_or(0.0),
        });
        self.index.insert(name.to_string(), idx);
        idx
    }

    fn set2(&mut self, name: &str, value: &str, force: bool) -> usize {
        let idx = match self.index.get(name).copied() {
            Some(idx) => idx,
            None => return self.get(name, value, CvarFlags::empty()),
        };

        if !force && self.vars[idx].flags.contains(CvarFlags::NOSET) {
            con_printf(&format!("{} is write protected.\n", name));
            return idx;
        }

        if value == self.vars[idx].string {
            return idx; // not changed
        }

        self.vars[idx].modified = true;
        self.vars[idx].string = value.to_string();
        self.vars[idx].value = value.parse::<f32>().unwrap_or(0.0);
        idx
    }

    /// Set a cvar value (respects the NOSET flag).
    pub fn set(&mut self, name: &str, value: &str) -> usize {
        self.set2(name, value, false)
    }

    /// Force-set a cvar value (ignores NOSET).
    pub fn force_set(&mut self, name: &str, value: &str) -> usize {
        self.set2(name, value, true)
    }

    /// Set a cvar from a float value.
    pub fn set_value(&mut self, name: &str, value: f32) {
        let val_str = if value == (value as i32) as f32 {
            format!("{}", value as i32)
        } else {
            format!("{}", value)
        };
        self.set(name, &val_str);
    }

    /// Write all archived cvars to a writer.
    pub fn write_variables(&self, writer: &mut dyn std::io::Write) -> std::io::Result<()> {
        for var in &self.vars {
            if var.flags.contains(CvarFlags::ARCHIVE) {
                writeln!(writer, "set {} \"{}\"", var.name, var.string)?;
            }
        }
        Ok(())
    }

    /// Print all cvars with their flag markers.
    pub fn list(&self) -> usize {
        for var in &self.vars {
            let archive = if var.flags.contains(CvarFlags::ARCHIVE) { '*' } else { ' ' };
            let noset = if var.flags.contains(CvarFlags::NOSET) { '-' } else { ' ' };
            con_printf(&format!("{}{} {} \"{}\"\n", archive, noset, var.name, var.string));
        }
        con_printf(&format!("{} cvars\n", self.vars.len()));
        self.vars.len()
    }
}

impl Default for CvarContext {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================
// Tests
// ============================================================

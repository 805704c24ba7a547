use std::fmt;

use super::builder::RoutineBody;
use super::instr::Instr;

impl fmt::Display for RoutineBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.locals.is_empty() {
            write!(f, "  .locals (")?;
            for (i, local) in self.locals.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                match &local.name {
                    Some(name) => write!(f, "[{i}] {} ${name}", local.repr)?,
                    None => write!(f, "[{i}] {}", local.repr)?,
                }
            }
            writeln!(f, ")")?;
        }
        let mut depth = 1usize;
        for instr in &self.instrs {
            match instr {
                Instr::MarkLabel(_) => {
                    writeln!(f, "{instr}")?;
                    continue;
                }
                Instr::BeginCatch(_) | Instr::BeginFinally | Instr::EndTry => {
                    depth = depth.saturating_sub(1).max(1);
                }
                _ => {}
            }
            writeln!(f, "{:indent$}{instr}", "", indent = depth * 2)?;
            if matches!(instr, Instr::BeginTry | Instr::BeginCatch(_) | Instr::BeginFinally) {
                depth += 1;
            }
        }
        Ok(())
    }
}

//! Text listings for methods and instructions.

use std::fmt;

use itertools::Itertools;

use super::instruction::{ConstValue, InstrKind, Instruction};
use super::method::{Block, Method};

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(output) = self.output {
            write!(f, "v{} <- ", output.0)?;
        }
        write!(f, "{:<18}", self.name())?;
        let inputs = self.inputs.iter().map(|v| format!("v{}", v.0)).join(", ");
        match &self.kind {
            InstrKind::Argument { index } => write!(f, "#{}", index),
            InstrKind::Const { value } => match value {
                ConstValue::Int(v) => write!(f, "{}", v),
                ConstValue::String(s) => write!(f, "{:?}", s),
                ConstValue::Class(ty) => write!(f, "{}", ty),
                ConstValue::Null => f.write_str("null"),
            },
            InstrKind::NewInstance { class } => write!(f, "{}", class),
            InstrKind::Invoke {
                method,
                relocatable,
                ..
            } => {
                write!(f, "{{{}}} {}", inputs, method)?;
                if !relocatable {
                    f.write_str(" [pinned]")?;
                }
                Ok(())
            }
            _ => f.write_str(&inputs),
        }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  block {}:", self.id.0)?;
        for instruction in &self.instructions {
            writeln!(f, "    {}", instruction)?;
        }
        if !self.successors.is_empty() {
            writeln!(
                f,
                "    -> {}",
                self.successors.iter().map(|b| b.0).join(", ")
            )?;
        }
        for handler in &self.catch_handlers {
            writeln!(f, "    catch {} -> {}", handler.guard, handler.target.0)?;
        }
        Ok(())
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "method {}", self.reference)?;
        for block in &self.blocks {
            write!(f, "{}", block)?;
        }
        Ok(())
    }
}

//! CPLEX LP text export of a compiled program, for debugging a model by hand
//! or feeding it to an external solver.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use itertools::Itertools;
use tracing::info;

use super::program::{LinearProgram, VarId};
use crate::error::{DispatchError, Result, Stage};

const TERMS_PER_LINE: usize = 6;

pub fn write_lp<W: Write>(program: &LinearProgram, out: &mut W) -> io::Result<()> {
    writeln!(out, "\\ written by bev-dispatch")?;
    writeln!(out, "Minimize")?;
    if program.objective.is_empty() {
        match program.variables.first() {
            Some(v) => writeln!(out, " obj: 0 {}", v.name)?,
            None => writeln!(out, " obj:")?,
        }
    } else {
        writeln!(out, " obj: {}", format_terms(program, &program.objective))?;
    }

    writeln!(out, "Subject To")?;
    for c in &program.constraints {
        writeln!(
            out,
            " {}: {} {} {}",
            c.name,
            format_terms(program, &c.terms),
            c.sense,
            c.rhs
        )?;
    }

    writeln!(out, "Bounds")?;
    for v in &program.variables {
        match v.upper {
            Some(u) if u == v.lower => writeln!(out, " {} = {u}", v.name)?,
            Some(u) => writeln!(out, " {} <= {} <= {u}", v.lower, v.name)?,
            None => writeln!(out, " {} >= {}", v.name, v.lower)?,
        }
    }
    writeln!(out, "End")
}

fn format_terms(program: &LinearProgram, terms: &[(VarId, f64)]) -> String {
    if terms.is_empty() {
        return "0".to_string();
    }
    terms
        .iter()
        .enumerate()
        .map(|(i, (v, c))| {
            let name = &program.variables[v.0].name;
            let sign = if *c < 0.0 { "-" } else { "+" };
            let term = format!("{sign} {} {name}", c.abs());
            if i > 0 && i % TERMS_PER_LINE == 0 {
                format!("\n   {term}")
            } else {
                term
            }
        })
        .join(" ")
}

/// Write the program to `path`, creating parent directories.
pub fn write_lp_file(program: &LinearProgram, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| DispatchError::io(Stage::Compile, parent, e))?;
    }
    let file = fs::File::create(path).map_err(|e| DispatchError::io(Stage::Compile, path, e))?;
    let mut out = BufWriter::new(file);
    write_lp(program, &mut out)
        .and_then(|()| out.flush())
        .map_err(|e| DispatchError::io(Stage::Compile, path, e))?;
    info!(path = %path.display(), "stored lp-file");
    Ok(())
}

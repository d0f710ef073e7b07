//! Textual model and solution dumps for debugging.

use crate::model::{ConstrSense, MipModel, ObjSense, Solution, VarType};
use std::io::Write;

pub(crate) fn write_lp(model: &MipModel, path: &std::path::Path) -> std::io::Result<()> {
    let mut w = std::io::BufWriter::new(std::fs::File::create(path)?);
    writeln!(w, "\\ written by epx-mip")?;
    match model.sense.0 {
        ObjSense::Minimize => writeln!(w, "Minimize")?,
        ObjSense::Maximize => writeln!(w, "Maximize")?,
    }
    write!(w, " obj:")?;
    for var in model.vars.iter().filter(|v| v.obj != 0.0) {
        write!(w, " {:+} {}", var.obj, var.name)?;
    }
    if !model.quad.is_empty() {
        write!(w, " + [")?;
        for &(i, j, v) in &model.quad {
            write!(
                w,
                " {:+} {} * {}",
                2.0 * v,
                model.vars[i].name,
                model.vars[j].name
            )?;
        }
        write!(w, " ] / 2")?;
    }
    writeln!(w)?;
    writeln!(w, "Subject To")?;
    for row in &model.rows {
        write!(w, " {}:", row.name)?;
        for &(c, v) in &row.coeffs {
            write!(w, " {:+} {}", v, model.vars[c].name)?;
        }
        let sense = match row.sense {
            ConstrSense::Le => "<=",
            ConstrSense::Eq => "=",
            ConstrSense::Ge => ">=",
        };
        writeln!(w, " {} {}", sense, row.rhs)?;
    }
    for ind in &model.indicators {
        write!(w, " {}: {} = 1 ->", ind.name, model.vars[ind.bin].name)?;
        for &(c, v) in &ind.coeffs {
            write!(w, " {:+} {}", v, model.vars[c].name)?;
        }
        writeln!(w, " <= {}", ind.rhs)?;
    }
    writeln!(w, "Bounds")?;
    for var in &model.vars {
        if var.vtype == VarType::Continuous {
            writeln!(w, " {} <= {} <= {}", var.lb, var.name, var.ub)?;
        }
    }
    let binaries: Vec<&str> = model
        .vars
        .iter()
        .filter(|v| v.vtype == VarType::Binary)
        .map(|v| v.name.as_str())
        .collect();
    if !binaries.is_empty() {
        writeln!(w, "Binaries")?;
        writeln!(w, " {}", binaries.join(" "))?;
    }
    writeln!(w, "End")?;
    Ok(())
}

pub(crate) fn write_sol(
    model: &MipModel,
    path: &std::path::Path,
    sol: &Solution,
) -> std::io::Result<()> {
    let mut w = std::io::BufWriter::new(std::fs::File::create(path)?);
    writeln!(w, "# status {:?}", sol.status)?;
    writeln!(w, "# objective {}", sol.objective)?;
    for (i, var) in model.vars.iter().enumerate() {
        writeln!(w, "{} {}", var.name, sol.value(i))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::model::*;

    #[test]
    fn lp_and_sol_files_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = MipModel::new();
        let x = m.add_var("x", 0.0, 2.0, VarType::Continuous);
        let u = m.add_var("u", 0.0, 1.0, VarType::Binary);
        m.set_obj_coeff(x, -1.0);
        m.add_constr("row", vec![(x, 1.0), (u, 1.0)], ConstrSense::Le, 2.0);
        m.add_indicator("ind", u, vec![(x, 1.0)], 0.0).unwrap();

        let lp = dir.path().join("m.lp");
        m.write_lp(&lp).unwrap();
        let text = std::fs::read_to_string(&lp).unwrap();
        assert!(text.contains("Minimize"));
        assert!(text.contains("Binaries"));
        assert!(text.contains("u = 1 ->"));

        let sol = m.optimize().unwrap();
        let sol_path = dir.path().join("m.sol");
        m.write_sol(&sol_path, &sol).unwrap();
        let text = std::fs::read_to_string(&sol_path).unwrap();
        assert!(text.contains("# objective"));
        assert!(text.contains("x "));
    }
}

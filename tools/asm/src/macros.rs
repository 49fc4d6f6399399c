use std::{collections::HashSet, mem};

use indexmap::IndexMap;

use crate::{AsmError, Pos, Row};

/// A macro body captured between `macro` and `endmacro`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Macro {
    pub formals: Vec<String>,
    pub rows: Vec<Row>,
    pub pos: Pos,
}

/// Macros keyed by lower-cased name.
pub type Macros = IndexMap<String, Macro>;

fn placeholder(row: &Row) -> Row {
    Row::note(
        row.pos.clone(),
        format!(
            "; {:>12} {:>12}  {:<20} {}",
            row.label,
            row.opcode,
            row.joined_args(),
            row.comment
        ),
    )
}

/// Pull every macro definition out of `rows`.
///
/// The definition rows are replaced with comment-only rows so the listing
/// still shows them.
pub fn define(rows: Vec<Row>) -> Result<(Vec<Row>, Macros), AsmError> {
    let mut macros = Macros::new();
    let mut out = Vec::with_capacity(rows.len());
    let mut current: Option<String> = None;

    for row in rows {
        if let Some(name) = current.clone() {
            out.push(placeholder(&row));
            if row.opcode == "endmacro" {
                current = None;
            } else if let Some(mac) = macros.get_mut(&name) {
                mac.rows.push(row);
            }
            continue;
        }
        match row.opcode.as_str() {
            "macro" => {
                if row.label.is_empty() {
                    return Err(AsmError::Syntax {
                        pos: row.pos,
                        msg: "cannot define a macro without a label".to_string(),
                    });
                }
                let name = row.label.to_ascii_lowercase();
                if let Some(prev) = macros.get(&name) {
                    return Err(AsmError::Redefined {
                        pos: row.pos,
                        name,
                        first: prev.pos.clone(),
                    });
                }
                out.push(Row::note(row.pos.clone(), "; MACRO DEFINITION".to_string()));
                out.push(placeholder(&row));
                macros.insert(
                    name.clone(),
                    Macro {
                        formals: row.args,
                        rows: Vec::new(),
                        pos: row.pos,
                    },
                );
                current = Some(name);
            }
            "endmacro" => {
                return Err(AsmError::Syntax {
                    pos: row.pos,
                    msg: "`endmacro` without `macro`".to_string(),
                })
            }
            _ => out.push(row),
        }
    }

    if let Some(name) = current {
        let pos = macros[&name].pos.clone();
        return Err(AsmError::Syntax {
            pos,
            msg: format!("macro `{name}` is missing its `endmacro`"),
        });
    }
    Ok((out, macros))
}

struct Expander<'m> {
    macros: &'m Macros,
    serial: usize,
    unique: String,
    active: HashSet<&'m str>,
    out: Vec<Row>,
}

impl<'m> Expander<'m> {
    fn mint(&mut self, prefix: char) -> String {
        self.serial += 1;
        format!("{prefix}{}__", self.serial)
    }

    fn splice(&mut self, mut row: Row) -> Result<(), AsmError> {
        // `@` belongs to whatever namespace is live where the row appears
        row.label = row.label.replace('@', &self.unique);
        for arg in row.args.iter_mut() {
            *arg = arg.replace('@', &self.unique);
        }

        let macros = self.macros;
        let Some((name, mac)) = macros.get_key_value(&row.opcode) else {
            self.out.push(row);
            return Ok(());
        };
        if !self.active.insert(name.as_str()) {
            return Err(AsmError::Recursion {
                pos: row.pos,
                name: name.clone(),
            });
        }
        if row.args.len() != mac.formals.len() {
            return Err(AsmError::Arity {
                pos: row.pos,
                name: name.clone(),
                expected: mac.formals.len(),
                got: row.args.len(),
            });
        }

        let unique = self.mint('M');
        let saved = mem::replace(&mut self.unique, unique);

        // a label on the invocation marks the first expanded row
        self.out.push(Row {
            label: mem::take(&mut row.label),
            ..Row::note(
                row.pos.clone(),
                format!("; Expanded macro {} ( {} )", row.opcode, row.joined_args()),
            )
        });
        for inner in &mac.rows {
            let mut copy = inner.clone();
            for (formal, actual) in mac.formals.iter().zip(&row.args) {
                if formal.is_empty() {
                    continue;
                }
                copy.label = copy.label.replace(formal.as_str(), actual);
                copy.opcode = copy.opcode.replace(formal.as_str(), actual);
                for arg in copy.args.iter_mut() {
                    *arg = arg.replace(formal.as_str(), actual);
                }
            }
            self.splice(copy)?;
        }
        self.out.push(Row::note(row.pos, "; End Expansion".to_string()));

        self.unique = saved;
        self.active.remove(name.as_str());
        Ok(())
    }
}

/// Replace every macro invocation with a renamed copy of its body.
///
/// Each invocation gets its own `M<n>__` token for `@`, and each run of rows
/// between wholly blank rows gets a `B<n>__` token, both from one serial.
pub fn expand(macros: &Macros, rows: Vec<Row>) -> Result<Vec<Row>, AsmError> {
    let mut ex = Expander {
        macros,
        serial: 1,
        unique: "B1__".to_string(),
        active: HashSet::new(),
        out: Vec::with_capacity(rows.len()),
    };
    for row in rows {
        if row.is_blank() {
            ex.unique = ex.mint('B');
        }
        ex.active.clear();
        ex.splice(row)?;
    }
    Ok(ex.out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::parse_lines;

    fn run(source: &str) -> Result<Vec<Row>, AsmError> {
        let rows = parse_lines("test.owl", source)?;
        let (rows, macros) = define(rows)?;
        expand(&macros, rows)
    }

    fn code(rows: &[Row]) -> Vec<(String, String, Vec<String>)> {
        rows.iter()
            .filter(|row| !row.opcode.is_empty() || !row.label.is_empty())
            .map(|row| (row.label.clone(), row.opcode.clone(), row.args.clone()))
            .collect()
    }

    #[test]
    fn definitions_become_comments() {
        let (rows, macros) = define(
            parse_lines("test.owl", "foo macro x\n mv x, a\n endmacro\n inca\n").unwrap(),
        )
        .unwrap();
        assert_eq!(rows.len(), 5);
        assert!(rows[..4].iter().all(|row| row.opcode.is_empty()));
        assert_eq!(rows[0].comment, "; MACRO DEFINITION");
        assert_eq!(rows[4].opcode, "inca");
        assert_eq!(macros["foo"].formals, vec!["x"]);
        assert_eq!(macros["foo"].rows.len(), 1);
    }

    #[test]
    fn formals_are_substituted() {
        let rows = run("foo macro x\n mv x, a\n endmacro\n foo b\n").unwrap();
        assert_eq!(
            code(&rows),
            vec![(String::new(), "mv".to_string(), vec!["b".to_string(), "a".to_string()])]
        );
        let expanded = rows
            .iter()
            .find(|row| row.comment.starts_with("; Expanded macro"))
            .unwrap();
        assert_eq!(expanded.comment, "; Expanded macro foo ( b )");
        assert_eq!(rows.last().unwrap().comment, "; End Expansion");
    }

    #[test]
    fn internal_labels_never_collide() {
        let src = "\
spin macro
@loop: deca
 bnz @loop
 endmacro
 spin
 spin
";
        let rows = run(src).unwrap();
        let labels: Vec<_> = rows
            .iter()
            .filter(|row| row.opcode == "deca")
            .map(|row| row.label.clone())
            .collect();
        assert_eq!(labels.len(), 2);
        assert_ne!(labels[0], labels[1]);
        assert!(labels.iter().all(|label| !label.contains('@')));

        let targets: Vec<_> = rows
            .iter()
            .filter(|row| row.opcode == "bnz")
            .map(|row| row.args[0].clone())
            .collect();
        assert_eq!(targets, labels);
    }

    #[test]
    fn blank_rows_open_new_namespaces() {
        let rows = run("@x: inca\n\n@x: deca\n").unwrap();
        assert_eq!(rows[0].label, "B1__x");
        assert_eq!(rows[2].label, "B2__x");
    }

    #[test]
    fn nested_invocations_expand() {
        let src = "\
one macro r
 mv r, a
 endmacro
two macro r
 one r
 one r
 endmacro
 two h
";
        let rows = run(src).unwrap();
        let mvs = code(&rows);
        assert_eq!(mvs.len(), 2);
        assert!(mvs.iter().all(|(_, op, args)| op == "mv" && args[0] == "h"));
    }

    #[test]
    fn caller_at_labels_stay_with_the_caller() {
        let src = "\
jump macro to
 bnz to
 endmacro
@top: inca
 jump @top
";
        let rows = run(src).unwrap();
        let bnz = rows.iter().find(|row| row.opcode == "bnz").unwrap();
        assert_eq!(bnz.args, vec!["B1__top"]);
    }

    #[test]
    fn self_recursion_fails() {
        let err = run("bad macro\n bad\n endmacro\n bad\n").unwrap_err();
        assert!(matches!(err, AsmError::Recursion { ref name, .. } if name == "bad"));
    }

    #[test]
    fn mutual_recursion_fails() {
        let src = "ping macro\n pong\n endmacro\npong macro\n ping\n endmacro\n ping\n";
        assert!(matches!(run(src), Err(AsmError::Recursion { .. })));
    }

    #[test]
    fn sibling_invocations_are_not_recursion() {
        let src = "one macro\n inca\n endmacro\ntwo macro\n one\n one\n endmacro\n two\n two\n";
        let rows = run(src).unwrap();
        assert_eq!(rows.iter().filter(|row| row.opcode == "inca").count(), 4);
    }

    #[test]
    fn definition_errors() {
        assert!(matches!(run(" macro x\n endmacro\n"), Err(AsmError::Syntax { .. })));
        assert!(matches!(run("foo macro\n inca\n"), Err(AsmError::Syntax { .. })));
        assert!(matches!(run(" endmacro\n"), Err(AsmError::Syntax { .. })));
        assert!(matches!(
            run("foo macro\n endmacro\nfoo macro\n endmacro\n"),
            Err(AsmError::Redefined { .. })
        ));
    }

    #[test]
    fn invocation_arity() {
        let err = run("foo macro x, y\n mv x, y\n endmacro\n foo a\n").unwrap_err();
        assert!(matches!(
            err,
            AsmError::Arity {
                expected: 2,
                got: 1,
                ..
            }
        ));
    }
}

//! Serializer for the final basis-expression table.
//!
//! The table is a nested-bracket text with two parts: relations keyed by point
//! number, then the vector behind each number.
//!
//! ```text
//! {
//!     {
//!         {1,
//!             {
//!                 {2,"-(3)/(2)"}
//!             }
//!         },
//!         {2,
//!             {
//! {2,"1"}}}
//!     },
//!     {
//!         {1,{0,1}},
//!         {2,{0,2}}
//!     }
//! }
//! ```
//!
//! A master renders as a unit self-reference; a reducible point lists each
//! non-pivot term with its normalized coefficient. The two dialects differ
//! only in how that coefficient is written.

use serde::{Deserialize, Serialize};

use crate::coeff::Coefficient;
use crate::error::{Error, Result};
use crate::overlay::TempOverlay;
use crate::point::Point;
use crate::relation::Relation;

/// How normalized coefficients are written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// `-(c_i)/(c_n)` verbatim, except for backends that evaluate ratios
    #[default]
    Legacy,
    /// Always the evaluated value of `-c_i / c_n`
    Uniform,
}

impl Dialect {
    fn evaluates<C: Coefficient>(self) -> bool {
        match self {
            Self::Legacy => C::EVALUATES_RATIOS,
            Self::Uniform => true,
        }
    }
}

/// Text accumulator for the table.
struct TableWriter {
    output: String,
    dialect: Dialect,
}

impl TableWriter {
    fn new(dialect: Dialect) -> Self {
        Self {
            output: String::new(),
            dialect,
        }
    }

    fn finish(self) -> String {
        self.output
    }

    fn write(&mut self, s: &str) {
        self.output.push_str(s);
    }

    fn writeln(&mut self, s: &str) {
        self.output.push_str(s);
        self.output.push('\n');
    }

    fn coefficient<C: Coefficient>(&self, owner: &Point, relation: &Relation<C>, coeff: &C) -> Result<String> {
        let Some(pivot) = relation.pivot() else {
            return Ok(coeff.to_string());
        };
        if !self.dialect.evaluates::<C>() {
            return Ok(format!("-({})/({})", coeff, pivot.coeff));
        }
        coeff
            .div_neg(&pivot.coeff)
            .map(|c| c.to_string())
            .ok_or_else(|| Error::invariant(format!("{:?}", owner), relation, "pivot coefficient is zero"))
    }

    fn relation<C: Coefficient>(&mut self, point: &Point, relation: &Relation<C>) -> Result<()> {
        self.writeln(&format!("        {{{},", point.number()));
        self.writeln("            {");
        if relation.is_empty() {
            self.write(&format!("{{{},\"1\"}}}}}}", point.number()));
            return Ok(());
        }
        let rest = relation.non_pivot();
        for (i, term) in rest.iter().enumerate() {
            let coeff = self.coefficient(point, relation, &term.coeff)?;
            self.write(&format!("                {{{},\"{}\"}}", term.point.number(), coeff));
            if i + 1 != rest.len() {
                self.write(",");
            }
            self.writeln("");
        }
        self.writeln("            }");
        self.write("        }");
        Ok(())
    }
}

/// Render `points` (ascending) with their staged relations.
pub fn render_table<'a, C, I>(points: I, overlay: &TempOverlay<C>, dialect: Dialect) -> Result<String>
where
    C: Coefficient,
    I: IntoIterator<Item = &'a Point>,
    I::IntoIter: Clone,
{
    let points = points.into_iter();
    let count = points.clone().count();
    let mut out = TableWriter::new(dialect);

    out.writeln("{");
    out.writeln("    {");
    for (i, point) in points.clone().enumerate() {
        out.relation(point, &overlay.get(point))?;
        if i + 1 != count {
            out.writeln(",");
        }
    }
    out.writeln("");
    out.writeln("    },");

    out.writeln("    {");
    for (i, point) in points.enumerate() {
        out.write(&format!("        {{{},{}}}", point.number(), point));
        if i + 1 != count {
            out.write(",");
        }
        out.writeln("");
    }
    out.writeln("    }");
    out.writeln("}");

    Ok(out.finish())
}

/// Evaluate a rendered coefficient, in either dialect.
pub fn parse_ratio<C: Coefficient>(text: &str) -> Result<C> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if let Some(body) = compact.strip_prefix("-(") {
        if let Some((numer, denom)) = body.split_once(")/(") {
            if let Some(denom) = denom.strip_suffix(')') {
                let numer = C::parse(numer)?;
                let denom = C::parse(denom)?;
                return numer
                    .div_neg(&denom)
                    .ok_or_else(|| Error::parse(format!("zero denominator in '{}'", text)));
            }
        }
    }
    C::parse(&compact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coeff::{PrimeField, Rational};

    #[test]
    fn test_parse_ratio_symbolic() {
        let c: Rational = parse_ratio("-(3)/(2)").unwrap();
        assert_eq!(c, Rational::new(-3, 2));
        let c: Rational = parse_ratio("-(-3/4)/(1/2)").unwrap();
        assert_eq!(c, Rational::new(3, 2));
    }

    #[test]
    fn test_parse_ratio_evaluated() {
        let c: PrimeField<101> = parse_ratio("50").unwrap();
        assert_eq!(c, PrimeField::new(50));
    }

    #[test]
    fn test_dialect_selection() {
        assert!(!Dialect::Legacy.evaluates::<Rational>());
        assert!(Dialect::Legacy.evaluates::<PrimeField>());
        assert!(Dialect::Uniform.evaluates::<Rational>());
    }
}

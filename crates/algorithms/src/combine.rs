//! Map algebra over named factor rasters
//!
//! A formula such as `2 * (land == 3) + slope / 10` is evaluated cell by
//! cell, each name standing for the value of one factor raster. Supported:
//! numbers, factor names, `+ - * /`, `^` (right associative), unary minus,
//! parentheses and the comparisons `< <= > >= == !=`, which yield 1 or 0.
//!
//! A cell is nodata in the output when any factor the formula reads is
//! nodata there, or when the result is not finite.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use landgrid_core::raster::Raster;
use landgrid_core::{Algorithm, Error, Result};

use crate::diagnostics::Diagnostics;
use crate::maybe_rayon::*;

/// A raster file bound to the name a formula refers to it by
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factor {
    pub name: String,
    pub raster: PathBuf,
}

/// Parameters of a combine run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombineConfig {
    pub formula: String,
    pub factors: Vec<Factor>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl BinOp {
    fn apply(self, l: f64, r: f64) -> f64 {
        let truth = |b: bool| if b { 1.0 } else { 0.0 };
        match self {
            BinOp::Add => l + r,
            BinOp::Sub => l - r,
            BinOp::Mul => l * r,
            BinOp::Div => l / r,
            BinOp::Pow => l.powf(r),
            BinOp::Lt => truth(l < r),
            BinOp::Le => truth(l <= r),
            BinOp::Gt => truth(l > r),
            BinOp::Ge => truth(l >= r),
            BinOp::Eq => truth(l == r),
            BinOp::Ne => truth(l != r),
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Pow => "^",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Name(String),
    Op(BinOp),
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{n}"),
            Token::Name(name) => f.write_str(name),
            Token::Op(op) => f.write_str(op.symbol()),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
        }
    }
}

fn tokenize(formula: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = formula.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        let (token, width) = match (c, next) {
            (c, _) if c.is_whitespace() => {
                i += 1;
                continue;
            }
            ('<', Some('=')) => (Token::Op(BinOp::Le), 2),
            ('>', Some('=')) => (Token::Op(BinOp::Ge), 2),
            ('=', Some('=')) => (Token::Op(BinOp::Eq), 2),
            ('!', Some('=')) => (Token::Op(BinOp::Ne), 2),
            ('<', _) => (Token::Op(BinOp::Lt), 1),
            ('>', _) => (Token::Op(BinOp::Gt), 1),
            ('+', _) => (Token::Op(BinOp::Add), 1),
            ('-', _) => (Token::Op(BinOp::Sub), 1),
            ('*', _) => (Token::Op(BinOp::Mul), 1),
            ('/', _) => (Token::Op(BinOp::Div), 1),
            ('^', _) => (Token::Op(BinOp::Pow), 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            (c, _) if c.is_ascii_digit() || c == '.' => {
                let end = (i..chars.len())
                    .find(|&j| !(chars[j].is_ascii_digit() || chars[j] == '.'))
                    .unwrap_or(chars.len());
                let text: String = chars[i..end].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| Error::config(format!("invalid number '{text}' in formula")))?;
                (Token::Number(n), end - i)
            }
            (c, _) if c.is_ascii_alphabetic() || c == '_' => {
                let end = (i..chars.len())
                    .find(|&j| !(chars[j].is_ascii_alphanumeric() || chars[j] == '_'))
                    .unwrap_or(chars.len());
                (Token::Name(chars[i..end].iter().collect()), end - i)
            }
            (c, _) => {
                return Err(Error::config(format!(
                    "unexpected character '{c}' at position {i} in formula"
                )));
            }
        };
        tokens.push(token);
        i += width;
    }
    Ok(tokens)
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Num(f64),
    /// Index into the factor list
    Factor(usize),
    Neg(Box<Expr>),
    Binary { op: BinOp, left: Box<Expr>, right: Box<Expr> },
}

impl Expr {
    fn eval(&self, values: &[f64]) -> f64 {
        match self {
            Expr::Num(n) => *n,
            Expr::Factor(i) => values[*i],
            Expr::Neg(inner) => -inner.eval(values),
            Expr::Binary { op, left, right } => op.apply(left.eval(values), right.eval(values)),
        }
    }

    fn collect_factors(&self, used: &mut [bool]) {
        match self {
            Expr::Num(_) => {}
            Expr::Factor(i) => used[*i] = true,
            Expr::Neg(inner) => inner.collect_factors(used),
            Expr::Binary { left, right, .. } => {
                left.collect_factors(used);
                right.collect_factors(used);
            }
        }
    }
}

/// Recursive descent over the token list; names resolve to factor indices
struct Parser<'n> {
    tokens: Vec<Token>,
    pos: usize,
    names: &'n [&'n str],
}

impl Parser<'_> {
    fn peek_op(&self) -> Option<BinOp> {
        match self.tokens.get(self.pos) {
            Some(Token::Op(op)) => Some(*op),
            _ => None,
        }
    }

    fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// comparison = additive (cmp additive)?
    fn comparison(&mut self) -> Result<Expr> {
        let left = self.additive()?;
        match self.peek_op() {
            Some(op @ (BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::Eq | BinOp::Ne)) => {
                self.pos += 1;
                let right = self.additive()?;
                Ok(Self::binary(op, left, right))
            }
            _ => Ok(left),
        }
    }

    fn additive(&mut self) -> Result<Expr> {
        let mut left = self.term()?;
        while let Some(op @ (BinOp::Add | BinOp::Sub)) = self.peek_op() {
            self.pos += 1;
            let right = self.term()?;
            left = Self::binary(op, left, right);
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr> {
        let mut left = self.unary()?;
        while let Some(op @ (BinOp::Mul | BinOp::Div)) = self.peek_op() {
            self.pos += 1;
            let right = self.unary()?;
            left = Self::binary(op, left, right);
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr> {
        match self.peek_op() {
            Some(BinOp::Sub) => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.unary()?)))
            }
            Some(BinOp::Add) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    /// power = atom ('^' unary)?, so `2^-1` and `2^3^2` parse
    fn power(&mut self) -> Result<Expr> {
        let base = self.atom()?;
        if self.peek_op() == Some(BinOp::Pow) {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(Self::binary(BinOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Expr> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        match token {
            Some(Token::Number(n)) => Ok(Expr::Num(n)),
            Some(Token::Name(name)) => self
                .names
                .iter()
                .position(|n| *n == name)
                .map(Expr::Factor)
                .ok_or_else(|| Error::config(format!("formula uses unknown factor '{name}'"))),
            Some(Token::LParen) => {
                let inner = self.comparison()?;
                match self.tokens.get(self.pos) {
                    Some(Token::RParen) => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    _ => Err(Error::config("missing closing parenthesis in formula")),
                }
            }
            Some(other) => Err(Error::config(format!("unexpected '{other}' in formula"))),
            None => Err(Error::config("formula ends unexpectedly")),
        }
    }
}

/// A parsed formula bound to an ordered list of factor names
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    expr: Expr,
    used: Vec<bool>,
}

impl Formula {
    /// Parse `text`, resolving names against `factors`
    pub fn parse(text: &str, factors: &[&str]) -> Result<Self> {
        let tokens = tokenize(text)?;
        if tokens.is_empty() {
            return Err(Error::config("empty combination formula"));
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            names: factors,
        };
        let expr = parser.comparison()?;
        if let Some(extra) = parser.tokens.get(parser.pos) {
            return Err(Error::config(format!("unexpected '{extra}' after the end of the formula")));
        }
        let mut used = vec![false; factors.len()];
        expr.collect_factors(&mut used);
        Ok(Self { expr, used })
    }

    /// Whether factor `index` appears in the formula
    pub fn uses(&self, index: usize) -> bool {
        self.used.get(index).copied().unwrap_or(false)
    }

    /// Value for one cell, given every factor's value in list order
    pub fn eval(&self, values: &[f64]) -> f64 {
        self.expr.eval(values)
    }
}

/// Result of a combination
#[derive(Debug, Clone)]
pub struct CombineOutput {
    pub raster: Raster<f64>,
    pub diagnostics: Diagnostics,
}

fn check_names(factors: &[(&str, &Raster<f64>)]) -> Result<()> {
    if factors.is_empty() {
        return Err(Error::config("combination needs at least one factor"));
    }
    for (i, (name, _)) in factors.iter().enumerate() {
        let valid = name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(Error::config(format!("invalid factor name '{name}'")));
        }
        if factors[..i].iter().any(|(other, _)| other == name) {
            return Err(Error::config(format!("factor '{name}' is given twice")));
        }
    }
    Ok(())
}

/// Evaluate `formula` on every cell of `grid`'s geometry.
///
/// Every factor must share the grid's geometry (`DimensionMismatch`
/// otherwise). The output carries the grid's georeferencing with NaN as
/// nodata.
pub fn combine(grid: &Raster<f64>, factors: &[(&str, &Raster<f64>)], formula: &str) -> Result<CombineOutput> {
    check_names(factors)?;
    for (name, raster) in factors {
        grid.ensure_same_grid(*raster, &format!("factor '{name}'"))?;
    }
    let names: Vec<&str> = factors.iter().map(|(n, _)| *n).collect();
    let formula = Formula::parse(formula, &names)?;

    let mut diagnostics = Diagnostics::new();
    for (i, name) in names.iter().enumerate() {
        if !formula.uses(i) {
            diagnostics.warn_config(format!("factor '{name}' is not used by the formula"));
        }
    }
    let read: Vec<(usize, &Raster<f64>)> = factors
        .iter()
        .enumerate()
        .filter(|(i, _)| formula.uses(*i))
        .map(|(i, (_, raster))| (i, *raster))
        .collect();
    debug!(factors = factors.len(), read = read.len(), "combination");

    let (rows, cols) = grid.shape();
    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut values = vec![0.0; factors.len()];
            let mut row_data = vec![f64::NAN; cols];
            'cells: for (col, out) in row_data.iter_mut().enumerate() {
                for &(i, raster) in &read {
                    let v = unsafe { raster.get_unchecked(row, col) };
                    if raster.is_nodata(v) {
                        continue 'cells;
                    }
                    values[i] = v;
                }
                let result = formula.eval(&values);
                if result.is_finite() {
                    *out = result;
                }
            }
            row_data
        })
        .collect();

    let mut raster = grid.with_same_meta::<f64>(rows, cols);
    raster.set_nodata(Some(f64::NAN));
    raster.replace_data(data)?;

    let nodata = raster.data().iter().filter(|v| v.is_nan()).count();
    diagnostics.log_summary("combination");
    info!(nodata, "combination done");
    Ok(CombineOutput { raster, diagnostics })
}

/// Input of [`Combination`]: the reference grid and the named factors
#[derive(Debug, Clone)]
pub struct CombineInput {
    pub grid: Raster<f64>,
    pub factors: Vec<(String, Raster<f64>)>,
}

/// Combination as an [`Algorithm`]; the parameter is the formula
#[derive(Debug, Clone, Default)]
pub struct Combination;

impl Algorithm for Combination {
    type Input = CombineInput;
    type Output = CombineOutput;
    type Params = String;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Combination"
    }

    fn description(&self) -> &'static str {
        "Cell-by-cell formula over named factor rasters"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        let factors: Vec<(&str, &Raster<f64>)> = input.factors.iter().map(|(n, r)| (n.as_str(), r)).collect();
        combine(&input.grid, &factors, &params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use landgrid_core::GeoTransform;

    fn band(data: Vec<f64>) -> Raster<f64> {
        let mut r = Raster::from_vec(data, 2, 2).unwrap();
        r.set_transform(GeoTransform::new(0.0, 20.0, 10.0, -10.0));
        r.set_nodata(Some(-1.0));
        r
    }

    #[test]
    fn test_precedence() {
        let names = ["a", "b"];
        let eval = |text: &str| Formula::parse(text, &names).unwrap().eval(&[2.0, 3.0]);
        assert_relative_eq!(eval("a + b * 2"), 8.0);
        assert_relative_eq!(eval("(a + b) * 2"), 10.0);
        assert_relative_eq!(eval("-a ^ 2"), -4.0);
        assert_relative_eq!(eval("2 ^ 3 ^ 2"), 512.0);
        assert_relative_eq!(eval("a ^ -1"), 0.5);
        assert_relative_eq!(eval("a * 2 == b + 1"), 1.0);
        assert_relative_eq!(eval("(a < b) + (a >= 2) + (b != 3)"), 2.0);
    }

    #[test]
    fn test_invalid_formulas() {
        let names = ["land"];
        for bad in ["", "land +", "(land", "land )", "slope * 2", "land # 2", "2 land"] {
            let err = Formula::parse(bad, &names).unwrap_err();
            assert!(err.is_configuration(), "'{bad}' should be rejected");
        }
        let f = Formula::parse("land * 2", &["land", "slope"]).unwrap();
        assert!(f.uses(0));
        assert!(!f.uses(1));
    }

    #[test]
    fn test_combine_cells() {
        let land = band(vec![1.0, 3.0, -1.0, 3.0]);
        let slope = band(vec![10.0, 20.0, 30.0, -1.0]);
        let out = combine(&land, &[("land", &land), ("slope", &slope)], "2 * (land == 3) + slope / 10").unwrap();

        assert_relative_eq!(out.raster.get(0, 0).unwrap(), 1.0);
        assert_relative_eq!(out.raster.get(0, 1).unwrap(), 4.0);
        // nodata in either factor
        assert!(out.raster.get(1, 0).unwrap().is_nan());
        assert!(out.raster.get(1, 1).unwrap().is_nan());
        assert_relative_eq!(out.raster.cell_size(), 10.0);
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn test_division_by_zero_is_nodata() {
        let a = band(vec![1.0, 2.0, 0.0, 4.0]);
        let out = combine(&a, &[("a", &a)], "1 / a").unwrap();
        assert!(out.raster.get(1, 0).unwrap().is_nan());
        assert_relative_eq!(out.raster.get(1, 1).unwrap(), 0.25);
    }

    #[test]
    fn test_unused_factor_skips_its_nodata() {
        let a = band(vec![1.0, 2.0, 3.0, 4.0]);
        let b = band(vec![-1.0, -1.0, -1.0, -1.0]);
        let out = combine(&a, &[("a", &a), ("b", &b)], "a + 1").unwrap();
        assert_relative_eq!(out.raster.get(0, 0).unwrap(), 2.0);
        assert_eq!(out.diagnostics.len(), 1);
    }

    #[test]
    fn test_factor_geometry_must_match() {
        let a = band(vec![1.0; 4]);
        let wide = Raster::filled(2, 3, 1.0);
        assert!(matches!(
            combine(&a, &[("a", &a), ("w", &wide)], "a + w"),
            Err(Error::DimensionMismatch { .. })
        ));
        assert!(combine(&a, &[("a", &a), ("a", &a)], "a").unwrap_err().is_configuration());
        assert!(combine(&a, &[("1a", &a)], "a").unwrap_err().is_configuration());
        assert!(combine(&a, &[], "1").unwrap_err().is_configuration());
    }
}

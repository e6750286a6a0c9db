//! Equation evaluator.
//!
//! Evaluates a mathematical expression string to its canonical text form.
//! The value domain covers real numbers, complex numbers (`9 / 3 + 2i`),
//! matrices (`det([-1, 2; 3, 1])`), and unit quantities (`12.7 cm to inch`,
//! `sin(45 deg)`). Malformed input is an error, never a panic.

pub mod parser;
pub mod units;

use std::f64::consts::{E, PI};

use crate::error::CalcError;

use parser::{BinOp, Expr};
use units::{Dimension, UnitDef};

/// Evaluate an expression and render the result as text.
///
/// `12 / (2.3 + 0.7)` → `4`, `det([-1, 2; 3, 1])` → `-7`,
/// `sin(45 deg) ^ 2` → `0.5`.
pub fn evaluate(input: &str) -> Result<String, CalcError> {
    let expr = parser::parse(input)?;
    let value = eval(&expr)?;
    Ok(format_value(&value))
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Number(f64),
    Complex { re: f64, im: f64 },
    Matrix(Vec<Vec<f64>>),
    Quantity { value: f64, unit: UnitDef, display: String },
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Complex { .. } => "complex number",
            Value::Matrix(_) => "matrix",
            Value::Quantity { .. } => "unit value",
        }
    }
}

fn eval(expr: &Expr) -> Result<Value, CalcError> {
    match expr {
        Expr::Number(value) => Ok(Value::Number(*value)),
        Expr::Ident(name) => match name.as_str() {
            "pi" => Ok(Value::Number(PI)),
            "e" => Ok(Value::Number(E)),
            "i" => Ok(Value::Complex { re: 0.0, im: 1.0 }),
            other => Err(CalcError::Eval(format!("undefined symbol `{other}`"))),
        },
        Expr::Neg(inner) => negate(eval(inner)?),
        Expr::Binary(op, left, right) => {
            let left = eval(left)?;
            let right = eval(right)?;
            apply_binary(*op, left, right)
        }
        Expr::Call(name, args) => {
            let args = args.iter().map(eval).collect::<Result<Vec<_>, _>>()?;
            call_function(name, args)
        }
        Expr::Matrix(rows) => {
            let width = rows.first().map(Vec::len).unwrap_or(0);
            if width == 0 {
                return Err(CalcError::Eval("empty matrix".into()));
            }
            let mut numeric = Vec::with_capacity(rows.len());
            for row in rows {
                if row.len() != width {
                    return Err(CalcError::Eval("matrix rows have unequal lengths".into()));
                }
                let mut cells = Vec::with_capacity(width);
                for cell in row {
                    match eval(cell)? {
                        Value::Number(value) => cells.push(value),
                        other => {
                            return Err(CalcError::Eval(format!(
                                "matrix entries must be numbers, found {}",
                                other.type_name()
                            )))
                        }
                    }
                }
                numeric.push(cells);
            }
            Ok(Value::Matrix(numeric))
        }
        Expr::WithUnit(inner, name) => {
            let unit = units::lookup(name)
                .ok_or_else(|| CalcError::Eval(format!("unknown unit `{name}`")))?;
            match eval(inner)? {
                Value::Number(value) => Ok(Value::Quantity {
                    value,
                    unit,
                    display: name.clone(),
                }),
                other => Err(CalcError::Eval(format!(
                    "cannot attach a unit to a {}",
                    other.type_name()
                ))),
            }
        }
        Expr::Convert(inner, target_name) => {
            let target = units::lookup(target_name)
                .ok_or_else(|| CalcError::Eval(format!("unknown unit `{target_name}`")))?;
            match eval(inner)? {
                Value::Quantity { value, unit, .. } => {
                    if unit.dimension != target.dimension {
                        return Err(CalcError::Eval(format!(
                            "cannot convert {} to {}",
                            unit.dimension.name(),
                            target.dimension.name()
                        )));
                    }
                    Ok(Value::Quantity {
                        value: value * unit.factor / target.factor,
                        unit: target,
                        display: target_name.clone(),
                    })
                }
                other => Err(CalcError::Eval(format!(
                    "cannot convert a {} to `{target_name}`",
                    other.type_name()
                ))),
            }
        }
    }
}

fn negate(value: Value) -> Result<Value, CalcError> {
    Ok(match value {
        Value::Number(v) => Value::Number(-v),
        Value::Complex { re, im } => Value::Complex { re: -re, im: -im },
        Value::Matrix(rows) => Value::Matrix(
            rows.into_iter()
                .map(|row| row.into_iter().map(|v| -v).collect())
                .collect(),
        ),
        Value::Quantity { value, unit, display } => Value::Quantity {
            value: -value,
            unit,
            display,
        },
    })
}

fn apply_binary(op: BinOp, left: Value, right: Value) -> Result<Value, CalcError> {
    use Value::*;

    match (op, left, right) {
        (BinOp::Add, Number(a), Number(b)) => Ok(Number(a + b)),
        (BinOp::Sub, Number(a), Number(b)) => Ok(Number(a - b)),
        (BinOp::Mul, Number(a), Number(b)) => Ok(Number(a * b)),
        (BinOp::Div, Number(a), Number(b)) => Ok(Number(a / b)),
        (BinOp::Mod, Number(a), Number(b)) => Ok(Number(a % b)),
        (BinOp::Pow, Number(a), Number(b)) => Ok(Number(a.powf(b))),

        (op, Number(a), Complex { re, im }) => {
            complex_op(op, (a, 0.0), (re, im))
        }
        (op, Complex { re, im }, Number(b)) => {
            complex_op(op, (re, im), (b, 0.0))
        }
        (op, Complex { re: ar, im: ai }, Complex { re: br, im: bi }) => {
            complex_op(op, (ar, ai), (br, bi))
        }

        (BinOp::Add, Quantity { value: a, unit: ua, display }, Quantity { value: b, unit: ub, .. }) => {
            quantity_add(a, ua, display, b, ub, 1.0)
        }
        (BinOp::Sub, Quantity { value: a, unit: ua, display }, Quantity { value: b, unit: ub, .. }) => {
            quantity_add(a, ua, display, b, ub, -1.0)
        }
        (BinOp::Mul, Quantity { value, unit, display }, Number(b)) => Ok(Quantity {
            value: value * b,
            unit,
            display,
        }),
        (BinOp::Mul, Number(a), Quantity { value, unit, display }) => Ok(Quantity {
            value: a * value,
            unit,
            display,
        }),
        (BinOp::Div, Quantity { value, unit, display }, Number(b)) => Ok(Quantity {
            value: value / b,
            unit,
            display,
        }),

        (BinOp::Add, Matrix(a), Matrix(b)) => matrix_zip(a, b, |x, y| x + y),
        (BinOp::Sub, Matrix(a), Matrix(b)) => matrix_zip(a, b, |x, y| x - y),
        (BinOp::Mul, Matrix(a), Matrix(b)) => matrix_mul(a, b),
        (BinOp::Mul, Matrix(a), Number(b)) => Ok(Matrix(scale_matrix(a, b))),
        (BinOp::Mul, Number(a), Matrix(b)) => Ok(Matrix(scale_matrix(b, a))),
        (BinOp::Div, Matrix(a), Number(b)) => Ok(Matrix(scale_matrix(a, 1.0 / b))),

        (op, left, right) => Err(CalcError::Eval(format!(
            "cannot apply `{}` to {} and {}",
            op_symbol(op),
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn op_symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Mod => "%",
        BinOp::Pow => "^",
    }
}

fn complex_op(op: BinOp, a: (f64, f64), b: (f64, f64)) -> Result<Value, CalcError> {
    let (ar, ai) = a;
    let (br, bi) = b;
    let (re, im) = match op {
        BinOp::Add => (ar + br, ai + bi),
        BinOp::Sub => (ar - br, ai - bi),
        BinOp::Mul => (ar * br - ai * bi, ar * bi + ai * br),
        BinOp::Div => {
            let denom = br * br + bi * bi;
            if denom == 0.0 {
                return Err(CalcError::Eval("division of a complex number by zero".into()));
            }
            ((ar * br + ai * bi) / denom, (ai * br - ar * bi) / denom)
        }
        BinOp::Pow => {
            if bi != 0.0 {
                return Err(CalcError::Eval("complex exponents are not supported".into()));
            }
            return Ok(normalize_complex(complex_pow((ar, ai), br)));
        }
        BinOp::Mod => {
            return Err(CalcError::Eval("cannot apply `%` to complex numbers".into()));
        }
    };
    Ok(normalize_complex((re, im)))
}

/// Principal value of `c^n` for a real exponent, through polar form.
fn complex_pow(c: (f64, f64), n: f64) -> (f64, f64) {
    let (re, im) = c;
    let r = re.hypot(im);
    if r == 0.0 {
        return (0.0, 0.0);
    }
    let theta = im.atan2(re);
    let scale = r.powf(n);
    (scale * (n * theta).cos(), scale * (n * theta).sin())
}

/// Complex results with a vanishing imaginary part fold back to numbers.
fn normalize_complex((re, im): (f64, f64)) -> Value {
    if component_negligible(im, re) {
        Value::Number(re)
    } else {
        Value::Complex { re, im }
    }
}

/// True when `x` is float noise next to `other` (e.g. the `1.2e-16`
/// imaginary part of `i^2`).
fn component_negligible(x: f64, other: f64) -> bool {
    x.abs() <= 1e-10 * (1.0 + other.abs())
}

fn quantity_add(
    a: f64,
    ua: UnitDef,
    display: String,
    b: f64,
    ub: UnitDef,
    sign: f64,
) -> Result<Value, CalcError> {
    if ua.dimension != ub.dimension {
        return Err(CalcError::Eval(format!(
            "cannot combine {} and {}",
            ua.dimension.name(),
            ub.dimension.name()
        )));
    }
    Ok(Value::Quantity {
        value: a + sign * b * ub.factor / ua.factor,
        unit: ua,
        display,
    })
}

fn matrix_zip(
    a: Vec<Vec<f64>>,
    b: Vec<Vec<f64>>,
    op: impl Fn(f64, f64) -> f64,
) -> Result<Value, CalcError> {
    if a.len() != b.len() || a.first().map(Vec::len) != b.first().map(Vec::len) {
        return Err(CalcError::Eval("matrix dimensions do not match".into()));
    }
    let rows = a
        .into_iter()
        .zip(b)
        .map(|(ra, rb)| ra.into_iter().zip(rb).map(|(x, y)| op(x, y)).collect())
        .collect();
    Ok(Value::Matrix(rows))
}

fn matrix_mul(a: Vec<Vec<f64>>, b: Vec<Vec<f64>>) -> Result<Value, CalcError> {
    let inner = a.first().map(Vec::len).unwrap_or(0);
    if inner != b.len() {
        return Err(CalcError::Eval("matrix dimensions do not match".into()));
    }
    let width = b.first().map(Vec::len).unwrap_or(0);
    let mut out = vec![vec![0.0; width]; a.len()];
    for (i, row) in a.iter().enumerate() {
        for j in 0..width {
            out[i][j] = (0..inner).map(|k| row[k] * b[k][j]).sum();
        }
    }
    Ok(Value::Matrix(out))
}

fn scale_matrix(rows: Vec<Vec<f64>>, factor: f64) -> Vec<Vec<f64>> {
    rows.into_iter()
        .map(|row| row.into_iter().map(|v| v * factor).collect())
        .collect()
}

fn call_function(name: &str, mut args: Vec<Value>) -> Result<Value, CalcError> {
    let expect_one = |args: &mut Vec<Value>| -> Result<Value, CalcError> {
        if args.len() == 1 {
            Ok(args.remove(0))
        } else {
            Err(CalcError::Eval(format!(
                "{name} expects exactly one argument"
            )))
        }
    };

    match name {
        "sin" | "cos" | "tan" => {
            let radians = angle_in_radians(expect_one(&mut args)?)?;
            let result = match name {
                "sin" => radians.sin(),
                "cos" => radians.cos(),
                _ => radians.tan(),
            };
            Ok(Value::Number(result))
        }
        "asin" | "acos" | "atan" => {
            let value = number_arg(name, expect_one(&mut args)?)?;
            let result = match name {
                "asin" => value.asin(),
                "acos" => value.acos(),
                _ => value.atan(),
            };
            if result.is_nan() {
                Err(CalcError::Eval(format!("{name} argument out of range")))
            } else {
                Ok(Value::Number(result))
            }
        }
        "sqrt" => match expect_one(&mut args)? {
            Value::Number(v) if v >= 0.0 => Ok(Value::Number(v.sqrt())),
            Value::Number(v) => Ok(Value::Complex {
                re: 0.0,
                im: (-v).sqrt(),
            }),
            Value::Complex { re, im } => Ok(normalize_complex(complex_pow((re, im), 0.5))),
            other => Err(CalcError::Eval(format!(
                "sqrt is not defined for a {}",
                other.type_name()
            ))),
        },
        "abs" => match expect_one(&mut args)? {
            Value::Number(v) => Ok(Value::Number(v.abs())),
            Value::Complex { re, im } => Ok(Value::Number(re.hypot(im))),
            Value::Quantity { value, unit, display } => Ok(Value::Quantity {
                value: value.abs(),
                unit,
                display,
            }),
            other => Err(CalcError::Eval(format!(
                "abs is not defined for a {}",
                other.type_name()
            ))),
        },
        "exp" => Ok(Value::Number(number_arg(name, expect_one(&mut args)?)?.exp())),
        "ln" | "log" => {
            let value = number_arg(name, expect_one(&mut args)?)?;
            if value > 0.0 {
                Ok(Value::Number(value.ln()))
            } else if value < 0.0 {
                // Principal branch: ln(-x) = ln(x) + pi*i.
                Ok(Value::Complex {
                    re: (-value).ln(),
                    im: PI,
                })
            } else {
                Err(CalcError::Eval("logarithm of zero".into()))
            }
        }
        "log10" => {
            let value = number_arg(name, expect_one(&mut args)?)?;
            if value > 0.0 {
                Ok(Value::Number(value.log10()))
            } else {
                Err(CalcError::Eval("log10 of a non-positive number".into()))
            }
        }
        "round" | "floor" | "ceil" => {
            let value = number_arg(name, expect_one(&mut args)?)?;
            let result = match name {
                "round" => value.round(),
                "floor" => value.floor(),
                _ => value.ceil(),
            };
            Ok(Value::Number(result))
        }
        "det" => match expect_one(&mut args)? {
            Value::Matrix(rows) => determinant(&rows).map(Value::Number),
            other => Err(CalcError::Eval(format!(
                "det expects a matrix, found {}",
                other.type_name()
            ))),
        },
        "transpose" => match expect_one(&mut args)? {
            Value::Matrix(rows) => {
                let height = rows.len();
                let width = rows.first().map(Vec::len).unwrap_or(0);
                let mut out = vec![vec![0.0; height]; width];
                for (i, row) in rows.iter().enumerate() {
                    for (j, cell) in row.iter().enumerate() {
                        out[j][i] = *cell;
                    }
                }
                Ok(Value::Matrix(out))
            }
            other => Err(CalcError::Eval(format!(
                "transpose expects a matrix, found {}",
                other.type_name()
            ))),
        },
        other => Err(CalcError::Eval(format!("unknown function `{other}`"))),
    }
}

fn number_arg(name: &str, value: Value) -> Result<f64, CalcError> {
    match value {
        Value::Number(v) => Ok(v),
        other => Err(CalcError::Eval(format!(
            "{name} expects a number, found {}",
            other.type_name()
        ))),
    }
}

/// Plain numbers are already radians; angle quantities are converted.
fn angle_in_radians(value: Value) -> Result<f64, CalcError> {
    match value {
        Value::Number(v) => Ok(v),
        Value::Quantity { value, unit, .. } if unit.dimension == Dimension::Angle => {
            Ok(value * unit.factor)
        }
        other => Err(CalcError::Eval(format!(
            "expected an angle, found {}",
            other.type_name()
        ))),
    }
}

fn determinant(rows: &[Vec<f64>]) -> Result<f64, CalcError> {
    let n = rows.len();
    if n == 0 || rows.iter().any(|row| row.len() != n) {
        return Err(CalcError::Eval("det expects a square matrix".into()));
    }

    // Gaussian elimination with partial pivoting.
    let mut m: Vec<Vec<f64>> = rows.to_vec();
    let mut det = 1.0;
    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&a, &b| m[a][col].abs().total_cmp(&m[b][col].abs()))
            .unwrap_or(col);
        if m[pivot_row][col] == 0.0 {
            return Ok(0.0);
        }
        if pivot_row != col {
            m.swap(pivot_row, col);
            det = -det;
        }
        det *= m[col][col];
        for row in col + 1..n {
            let factor = m[row][col] / m[col][col];
            for k in col..n {
                m[row][k] -= factor * m[col][k];
            }
        }
    }
    Ok(det)
}

/// Round for display so accumulated float error does not leak into output
/// (`sin(45 deg)^2` is `0.5000000000000001` before rounding).
fn round_display(x: f64) -> f64 {
    if x == 0.0 || !x.is_finite() {
        return x;
    }
    let magnitude = x.abs().log10().floor();
    let factor = 10f64.powf(11.0 - magnitude);
    // Extreme magnitudes overflow or underflow the factor; leave those
    // values untouched rather than turning them into NaN.
    if !factor.is_finite() || factor == 0.0 {
        return x;
    }
    (x * factor).round() / factor
}

fn format_number(x: f64) -> String {
    if x.is_nan() {
        return "NaN".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    let rounded = round_display(x);
    if rounded == rounded.trunc() && rounded.abs() < 1e15 {
        format!("{}", rounded as i64)
    } else {
        format!("{rounded}")
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Number(v) => format_number(*v),
        Value::Complex { re, im } => format_complex(*re, *im),
        Value::Quantity { value, display, .. } => {
            format!("{} {display}", format_number(*value))
        }
        Value::Matrix(rows) => {
            let rendered: Vec<String> = rows
                .iter()
                .map(|row| {
                    let cells: Vec<String> = row.iter().map(|v| format_number(*v)).collect();
                    format!("[{}]", cells.join(", "))
                })
                .collect();
            format!("[{}]", rendered.join(", "))
        }
    }
}

fn format_complex(re: f64, im: f64) -> String {
    if component_negligible(im, re) {
        return format_number(re);
    }

    let magnitude = round_display(im.abs());
    let im_part = if magnitude == 1.0 {
        "i".to_string()
    } else {
        format!("{}i", format_number(magnitude))
    };

    if component_negligible(re, im) {
        if im < 0.0 {
            format!("-{im_part}")
        } else {
            im_part
        }
    } else {
        let sign = if im < 0.0 { "-" } else { "+" };
        format!("{} {sign} {im_part}", format_number(re))
    }
}

//! Derived climate parameters.
//!
//! A derived parameter is a small expression over the monthly values of base
//! parameters. Monthly values are reduced across months with one of the
//! seasonal reductions, combined arithmetically, then averaged over every year
//! of an interval.
//!
//! ```rust
//! use paleoview_core::formula::{DerivedParameterRegistry, Expr};
//! use paleoview_core::parameters::ParameterId;
//!
//! let registry = DerivedParameterRegistry::standard();
//! let isothermality = registry.get("temperature", "isothermality").unwrap();
//! assert_eq!(
//!     isothermality.formula,
//!     Expr::average(Expr::parameter(ParameterId::MaximumTemperature) - Expr::parameter(ParameterId::MinimumTemperature))
//!         / Expr::annual_range(Expr::parameter(ParameterId::MeanTemperature))
//!         * Expr::constant(100.0)
//! );
//! ```
//!
//! Non-gridded parameters are evaluated with the same machinery; their monthly
//! values are carried as 1x1 grids.

use crate::errors::{PaleoError, PaleoResult};
use crate::grid::{Grid, GridStack};
use crate::months::all_months;
use crate::parameters::{ParameterId, ParameterShape};
use crate::time::{YearAD, YearSpan};
use ndarray::{Array2, Axis, Zip};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::ops;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    fn apply(&self, lhs: f64, rhs: f64) -> f64 {
        match self {
            BinaryOp::Add => lhs + rhs,
            BinaryOp::Sub => lhs - rhs,
            BinaryOp::Mul => lhs * rhs,
            BinaryOp::Div => lhs / rhs,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }
}

/// Expression tree of a derived parameter
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// Monthly values of a base parameter
    Ref(ParameterId),
    Const(f64),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Mean across the selected months
    Average(Box<Expr>),
    /// Maximum minus minimum across all twelve months
    AnnualRange(Box<Expr>),
    /// Population standard deviation across the selected months
    StdevSeasonality(Box<Expr>),
    /// Standard deviation divided by mean across the selected months
    CoeffVarSeasonality(Box<Expr>),
}

/// What an expression evaluates to
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ValueKind {
    /// One grid per month
    Monthly,
    /// A single reduced grid
    Reduced,
    Constant,
}

impl Expr {
    pub fn parameter(parameter: ParameterId) -> Self {
        Expr::Ref(parameter)
    }

    pub fn constant(value: f64) -> Self {
        Expr::Const(value)
    }

    pub fn average(operand: Expr) -> Self {
        Expr::Average(Box::new(operand))
    }

    pub fn annual_range(operand: Expr) -> Self {
        Expr::AnnualRange(Box::new(operand))
    }

    pub fn stdev_seasonality(operand: Expr) -> Self {
        Expr::StdevSeasonality(Box::new(operand))
    }

    pub fn coeff_var_seasonality(operand: Expr) -> Self {
        Expr::CoeffVarSeasonality(Box::new(operand))
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Base parameters referenced, in first-use order
    pub fn parameters(&self) -> Vec<ParameterId> {
        let mut found = Vec::new();
        self.collect_parameters(&mut found);
        found
    }

    fn collect_parameters(&self, found: &mut Vec<ParameterId>) {
        match self {
            Expr::Ref(parameter) => {
                if !found.contains(parameter) {
                    found.push(*parameter);
                }
            }
            Expr::Const(_) => {}
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_parameters(found);
                rhs.collect_parameters(found);
            }
            Expr::Average(operand)
            | Expr::AnnualRange(operand)
            | Expr::StdevSeasonality(operand)
            | Expr::CoeffVarSeasonality(operand) => operand.collect_parameters(found),
        }
    }

    /// Check the expression is well formed and report what it evaluates to
    ///
    /// Reductions need monthly operands, and monthly and reduced values can not
    /// be combined.
    pub fn kind(&self) -> PaleoResult<ValueKind> {
        match self {
            Expr::Ref(_) => Ok(ValueKind::Monthly),
            Expr::Const(_) => Ok(ValueKind::Constant),
            Expr::Binary { op, lhs, rhs } => match (lhs.kind()?, rhs.kind()?) {
                (ValueKind::Constant, other) | (other, ValueKind::Constant) => Ok(other),
                (left, right) if left == right => Ok(left),
                _ => Err(PaleoError::InvalidFormula(format!(
                    "cannot combine monthly and reduced values in '{lhs} {} {rhs}'",
                    op.symbol()
                ))),
            },
            Expr::Average(operand)
            | Expr::AnnualRange(operand)
            | Expr::StdevSeasonality(operand)
            | Expr::CoeffVarSeasonality(operand) => match operand.kind()? {
                ValueKind::Monthly => Ok(ValueKind::Reduced),
                _ => Err(PaleoError::InvalidFormula(format!(
                    "'{self}' must reduce monthly values"
                ))),
            },
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Ref(parameter) => write!(f, "{parameter}"),
            Expr::Const(value) => write!(f, "{value}"),
            Expr::Binary { op, lhs, rhs } => write!(f, "({lhs} {} {rhs})", op.symbol()),
            Expr::Average(operand) => write!(f, "average({operand})"),
            Expr::AnnualRange(operand) => write!(f, "annual_range({operand})"),
            Expr::StdevSeasonality(operand) => write!(f, "stdev_seasonality({operand})"),
            Expr::CoeffVarSeasonality(operand) => write!(f, "coeff_var_seasonality({operand})"),
        }
    }
}

macro_rules! impl_expr_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl ops::$trait for Expr {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                Expr::binary($op, self, rhs)
            }
        }
    };
}

impl_expr_op!(Add, add, BinaryOp::Add);
impl_expr_op!(Sub, sub, BinaryOp::Sub);
impl_expr_op!(Mul, mul, BinaryOp::Mul);
impl_expr_op!(Div, div, BinaryOp::Div);

/// Supplies the monthly values of a base parameter for one year
///
/// Values are stacked with months on the first axis, in the rearranged order of
/// `month_indices`. Non-gridded parameters return a `[months][1][1]` stack.
pub trait MonthlyDataProvider {
    fn monthly_values(
        &mut self,
        parameter: ParameterId,
        year_ad: YearAD,
        month_indices: &[usize],
    ) -> PaleoResult<GridStack>;
}

#[derive(Clone, Debug)]
enum Value {
    Monthly(GridStack),
    Reduced(Grid),
    Constant(f64),
}

/// Evaluates one expression for one year, loading each (parameter, months) once
struct YearEvaluation<'a> {
    provider: &'a mut dyn MonthlyDataProvider,
    year_ad: YearAD,
    loaded: HashMap<(ParameterId, Vec<usize>), GridStack>,
}

impl YearEvaluation<'_> {
    fn evaluate(&mut self, expr: &Expr, months: &[usize]) -> PaleoResult<Value> {
        match expr {
            Expr::Ref(parameter) => {
                let key = (*parameter, months.to_vec());
                if let Some(values) = self.loaded.get(&key) {
                    return Ok(Value::Monthly(values.clone()));
                }
                let values = self.provider.monthly_values(*parameter, self.year_ad, months)?;
                self.loaded.insert(key, values.clone());
                Ok(Value::Monthly(values))
            }
            Expr::Const(value) => Ok(Value::Constant(*value)),
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.evaluate(lhs, months)?;
                let rhs = self.evaluate(rhs, months)?;
                combine(*op, lhs, rhs)
            }
            Expr::Average(operand) => {
                let values = self.monthly(operand, months)?;
                Ok(Value::Reduced(reduce(&values, mean)))
            }
            Expr::AnnualRange(operand) => {
                let values = self.monthly(operand, &all_months())?;
                Ok(Value::Reduced(reduce(&values, |v| max(v) - min(v))))
            }
            Expr::StdevSeasonality(operand) => {
                let values = self.monthly(operand, months)?;
                Ok(Value::Reduced(reduce(&values, population_stdev)))
            }
            Expr::CoeffVarSeasonality(operand) => {
                let values = self.monthly(operand, months)?;
                Ok(Value::Reduced(reduce(&values, |v| population_stdev(v) / mean(v))))
            }
        }
    }

    fn monthly(&mut self, expr: &Expr, months: &[usize]) -> PaleoResult<GridStack> {
        match self.evaluate(expr, months)? {
            Value::Monthly(values) => Ok(values),
            _ => Err(PaleoError::InvalidFormula(format!(
                "'{expr}' does not produce monthly values"
            ))),
        }
    }
}

fn combine(op: BinaryOp, lhs: Value, rhs: Value) -> PaleoResult<Value> {
    match (lhs, rhs) {
        (Value::Constant(a), Value::Constant(b)) => Ok(Value::Constant(op.apply(a, b))),
        (Value::Monthly(a), Value::Constant(b)) => Ok(Value::Monthly(a.mapv(|v| op.apply(v, b)))),
        (Value::Constant(a), Value::Monthly(b)) => Ok(Value::Monthly(b.mapv(|v| op.apply(a, v)))),
        (Value::Reduced(a), Value::Constant(b)) => Ok(Value::Reduced(a.mapv(|v| op.apply(v, b)))),
        (Value::Constant(a), Value::Reduced(b)) => Ok(Value::Reduced(b.mapv(|v| op.apply(a, v)))),
        (Value::Monthly(a), Value::Monthly(b)) => {
            if a.dim() != b.dim() {
                return Err(PaleoError::InvalidFormula(format!(
                    "monthly operands have shapes {:?} and {:?}",
                    a.dim(),
                    b.dim()
                )));
            }
            Ok(Value::Monthly(Zip::from(&a).and(&b).map_collect(|x, y| op.apply(*x, *y))))
        }
        (Value::Reduced(a), Value::Reduced(b)) => {
            if a.dim() != b.dim() {
                return Err(PaleoError::InvalidFormula(format!(
                    "reduced operands have shapes {:?} and {:?}",
                    a.dim(),
                    b.dim()
                )));
            }
            Ok(Value::Reduced(Zip::from(&a).and(&b).map_collect(|x, y| op.apply(*x, *y))))
        }
        _ => Err(PaleoError::InvalidFormula(
            "cannot combine monthly and reduced values".to_string(),
        )),
    }
}

/// Apply `f` to the months of every cell
fn reduce(values: &GridStack, f: impl Fn(&[f64]) -> f64) -> Grid {
    let (_, rows, cols) = values.dim();
    let mut months = Vec::with_capacity(values.len_of(Axis(0)));
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        months.clear();
        months.extend(values.slice(ndarray::s![.., r, c]).iter().copied());
        f(&months)
    })
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_stdev(values: &[f64]) -> f64 {
    let mean = mean(values);
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

/// Maximum, propagating NaN
fn max(values: &[f64]) -> f64 {
    values
        .iter()
        .copied()
        .reduce(|a, b| if a.is_nan() || b.is_nan() { f64::NAN } else { a.max(b) })
        .unwrap_or(f64::NAN)
}

/// Minimum, propagating NaN
fn min(values: &[f64]) -> f64 {
    values
        .iter()
        .copied()
        .reduce(|a, b| if a.is_nan() || b.is_nan() { f64::NAN } else { a.min(b) })
        .unwrap_or(f64::NAN)
}

/// Aggregated value of a parameter over one interval
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalValue {
    Grid(Grid),
    Scalar(f64),
}

impl IntervalValue {
    pub fn as_grid(&self) -> Option<&Grid> {
        match self {
            IntervalValue::Grid(grid) => Some(grid),
            IntervalValue::Scalar(_) => None,
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            IntervalValue::Scalar(value) => Some(*value),
            IntervalValue::Grid(_) => None,
        }
    }
}

/// A named derived parameter
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DerivedParameter {
    pub group: String,
    pub name: String,
    pub formula: Expr,
    pub shape: ParameterShape,
}

impl DerivedParameter {
    /// Validate a formula; the shape follows from the parameters it references
    pub fn new(group: &str, name: &str, formula: Expr) -> PaleoResult<Self> {
        if formula.kind()? != ValueKind::Reduced {
            return Err(PaleoError::InvalidFormula(format!(
                "{name}: '{formula}' does not reduce monthly values"
            )));
        }
        let shapes: Vec<ParameterShape> = formula.parameters().iter().map(|p| p.shape()).collect();
        let shape = match shapes.first() {
            Some(first) if shapes.iter().all(|s| s == first) => *first,
            Some(_) => {
                return Err(PaleoError::InvalidFormula(format!(
                    "{name}: mixes gridded and non-gridded parameters"
                )))
            }
            None => {
                return Err(PaleoError::InvalidFormula(format!(
                    "{name}: references no parameters"
                )))
            }
        };
        Ok(Self {
            group: group.to_string(),
            name: name.to_string(),
            formula,
            shape,
        })
    }

    pub fn is_gridded(&self) -> bool {
        self.shape == ParameterShape::Gridded
    }

    /// Base parameters needed by the formula
    pub fn base_parameters(&self) -> Vec<ParameterId> {
        self.formula.parameters()
    }

    /// Value of the formula for a single year
    pub fn evaluate_year(
        &self,
        provider: &mut dyn MonthlyDataProvider,
        year_ad: YearAD,
        month_indices: &[usize],
    ) -> PaleoResult<Grid> {
        let mut evaluation = YearEvaluation {
            provider,
            year_ad,
            loaded: HashMap::new(),
        };
        match evaluation.evaluate(&self.formula, month_indices)? {
            Value::Reduced(grid) => Ok(grid),
            _ => Err(PaleoError::InvalidFormula(format!(
                "{}: '{}' does not reduce monthly values",
                self.name, self.formula
            ))),
        }
    }

    /// Mean of the yearly values over every year of `span`
    ///
    /// `on_year` is called before each year is evaluated; an error from it
    /// aborts the interval.
    pub fn aggregate_interval(
        &self,
        provider: &mut dyn MonthlyDataProvider,
        span: &YearSpan,
        month_indices: &[usize],
        on_year: &mut dyn FnMut(YearAD) -> PaleoResult<()>,
    ) -> PaleoResult<IntervalValue> {
        if span.is_empty() {
            return Err(PaleoError::InvalidRequest(format!(
                "interval {}..{} contains no years",
                span.from_ad, span.until_ad
            )));
        }

        let mut sum: Option<Grid> = None;
        for year_ad in span.years() {
            on_year(year_ad)?;
            let value = self.evaluate_year(provider, year_ad, month_indices)?;
            sum = Some(match sum {
                None => value,
                Some(total) if total.dim() == value.dim() => total + value,
                Some(total) => {
                    return Err(PaleoError::InvalidFormula(format!(
                        "{}: yearly values changed shape from {:?} to {:?}",
                        self.name,
                        total.dim(),
                        value.dim()
                    )))
                }
            });
        }

        let mean = sum
            .map(|total| total / span.len() as f64)
            .ok_or_else(|| PaleoError::InvalidRequest("empty interval".to_string()))?;
        match self.shape {
            ParameterShape::Gridded => Ok(IntervalValue::Grid(mean)),
            ParameterShape::Scalar => Ok(IntervalValue::Scalar(mean.iter().next().copied().unwrap_or(f64::NAN))),
        }
    }
}

/// The set of derived parameters offered, grouped as presented to users
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedParameterRegistry {
    parameters: Vec<DerivedParameter>,
}

impl DerivedParameterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard climate statistics
    pub fn standard() -> Self {
        use ParameterId::*;
        let r = Expr::parameter;

        let definitions = vec![
            ("temperature", "mean-temperature", Expr::average(r(MeanTemperature))),
            ("temperature", "minimum-temperature", Expr::average(r(MinimumTemperature))),
            ("temperature", "maximum-temperature", Expr::average(r(MaximumTemperature))),
            (
                "temperature",
                "diurnal-temperature-range",
                Expr::average(r(MaximumTemperature) - r(MinimumTemperature)),
            ),
            ("temperature", "annual-temperature-range", Expr::annual_range(r(MeanTemperature))),
            (
                "temperature",
                "isothermality",
                Expr::average(r(MaximumTemperature) - r(MinimumTemperature))
                    / Expr::annual_range(r(MeanTemperature))
                    * Expr::constant(100.0),
            ),
            (
                "temperature",
                "temperature-seasonality",
                Expr::stdev_seasonality(r(MeanTemperature)) * Expr::constant(100.0),
            ),
            ("precipitation", "mean-precipitation", Expr::average(r(Precipitation))),
            (
                "precipitation",
                "precipitation-seasonality",
                Expr::coeff_var_seasonality(r(Precipitation)),
            ),
            ("humidity", "specific-humidity", Expr::average(r(SpecificHumidity))),
            ("humidity", "relative-humidity", Expr::average(r(RelativeHumidity))),
            ("sea-level-pressure", "sea-level-pressure", Expr::average(r(SeaLevelPressure))),
            ("southern-oscillation", "soi", Expr::average(r(Soi))),
            ("southern-oscillation", "enso", Expr::average(r(Enso))),
        ];

        let mut registry = Self::new();
        for (group, name, formula) in definitions {
            // The standard formulas are all well formed
            if let Ok(parameter) = DerivedParameter::new(group, name, formula) {
                registry.parameters.push(parameter);
            }
        }
        registry
    }

    /// Add or replace a derived parameter
    pub fn register(&mut self, parameter: DerivedParameter) {
        match self
            .parameters
            .iter_mut()
            .find(|p| p.group == parameter.group && p.name == parameter.name)
        {
            Some(existing) => *existing = parameter,
            None => self.parameters.push(parameter),
        }
    }

    pub fn get(&self, group: &str, name: &str) -> PaleoResult<&DerivedParameter> {
        self.parameters
            .iter()
            .find(|p| p.group == group && p.name == name)
            .ok_or_else(|| PaleoError::UnknownParameter {
                id: format!("{group}/{name}"),
            })
    }

    pub fn groups(&self) -> Vec<&str> {
        let mut groups: Vec<&str> = Vec::new();
        for parameter in &self.parameters {
            if !groups.contains(&parameter.group.as_str()) {
                groups.push(&parameter.group);
            }
        }
        groups
    }

    pub fn iter(&self) -> impl Iterator<Item = &DerivedParameter> {
        self.parameters.iter()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

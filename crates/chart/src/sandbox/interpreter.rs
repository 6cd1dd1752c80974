//! Capability-free evaluation of plotting scripts.
//!
//! The interpreter knows a fixed set of plotting, seaborn and numpy calls.
//! Each one either records data into a [`ChartSpec`] or does nothing; there
//! is no path to files, processes or the network.

use super::parser::{BinOp, Expr, Stmt, Target};
use super::spec::{ChartKind, ChartSpec, Panel, Series};
use super::CancelFlag;
use ragchart_core::{AppError, AppResult};
use std::collections::HashMap;

const MAX_PANELS: usize = 16;
const MAX_STRING_CHARS: usize = 4096;
const MAX_BINS: usize = 1000;
const DEFAULT_BINS: usize = 10;
/// Values a program may build, as a multiple of the point limit.
const NODE_BUDGET_FACTOR: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Module {
    Matplotlib,
    Pyplot,
    Style,
    Seaborn,
    Numpy,
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    None,
    Bool(bool),
    Num(f64),
    Str(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    /// numpy array of numbers, arithmetic is elementwise
    Array(Vec<f64>),
    Dict(Vec<(Value, Value)>),
    Module(Module),
    Figure,
    Axes(usize),
    /// Opaque return value of a plotting call
    Artist,
}

fn reject(msg: impl std::fmt::Display) -> AppError {
    AppError::Sandbox(msg.to_string())
}

/// Positional and keyword arguments of one call.
struct Args {
    pos: Vec<Value>,
    kw: Vec<(String, Value)>,
}

impl Args {
    fn kw(&self, name: &str) -> Option<&Value> {
        self.kw.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Keyword `name`, else positional `index`.
    fn get(&self, index: usize, name: &str) -> Option<&Value> {
        self.kw(name).or_else(|| self.pos.get(index))
    }

    fn require(&self, index: usize, name: &str, call: &str) -> AppResult<&Value> {
        self.get(index, name)
            .ok_or_else(|| reject(format!("{}() is missing argument '{}'", call, name)))
    }
}

/// Evaluates a parsed program into a chart description.
pub struct Interpreter {
    env: HashMap<String, Value>,
    chart: ChartSpec,
    current: usize,
    max_points: usize,
    points: usize,
    /// Values built so far, counted recursively, copies included
    nodes: usize,
    max_nodes: usize,
    cancel: CancelFlag,
}

impl Interpreter {
    /// `plt` is bound before the first statement runs.
    pub fn new(max_points: usize) -> Self {
        let mut env = HashMap::new();
        env.insert("plt".to_string(), Value::Module(Module::Pyplot));

        Self {
            env,
            chart: ChartSpec::default(),
            current: 0,
            max_points,
            points: 0,
            nodes: 0,
            max_nodes: max_points.saturating_mul(NODE_BUDGET_FACTOR),
            cancel: CancelFlag::default(),
        }
    }

    /// Stop at the next statement or allocation once `cancel` is set.
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run every statement and return the figure they describe.
    pub fn run(mut self, program: &[Stmt]) -> AppResult<ChartSpec> {
        for stmt in program {
            self.cancel.check()?;
            self.exec(stmt)?;
        }
        Ok(self.chart)
    }

    fn exec(&mut self, stmt: &Stmt) -> AppResult<()> {
        match stmt {
            Stmt::Import { module, alias } => {
                let (bound, value) = resolve_import(module, alias.as_deref())?;
                self.env.insert(bound, Value::Module(value));
            }
            Stmt::FromImport { module, names } => {
                for (name, alias) in names {
                    let value = match (module.as_str(), name.as_str()) {
                        ("matplotlib", "pyplot") => Module::Pyplot,
                        _ => {
                            return Err(reject(format!(
                                "import of '{}.{}' is not allowed",
                                module, name
                            )))
                        }
                    };
                    let bound = alias.clone().unwrap_or_else(|| name.clone());
                    self.env.insert(bound, Value::Module(value));
                }
            }
            Stmt::Assign { targets, value } => {
                let value = self.eval(value)?;
                // `a = b = value` stores one copy per extra target.
                let copies = targets.len().saturating_sub(1);
                self.charge(weight(&value).saturating_mul(copies))?;
                for target in targets {
                    self.bind(target, value.clone())?;
                }
            }
            Stmt::Expr(expr) => {
                self.eval(expr)?;
            }
        }
        Ok(())
    }

    fn bind(&mut self, target: &Target, value: Value) -> AppResult<()> {
        match target {
            Target::Name(name) => {
                if matches!(value, Value::Module(_)) {
                    return Err(reject("modules cannot be reassigned"));
                }
                self.env.insert(name.clone(), value);
                Ok(())
            }
            Target::Unpack(targets) => {
                let items = match value {
                    Value::Tuple(items) | Value::List(items) => items,
                    Value::Array(nums) => nums.into_iter().map(Value::Num).collect(),
                    _ => return Err(reject("cannot unpack a non-sequence")),
                };
                if items.len() != targets.len() {
                    return Err(reject(format!(
                        "expected {} values to unpack, got {}",
                        targets.len(),
                        items.len()
                    )));
                }
                for (t, v) in targets.iter().zip(items) {
                    self.bind(t, v)?;
                }
                Ok(())
            }
        }
    }

    fn eval(&mut self, expr: &Expr) -> AppResult<Value> {
        match expr {
            Expr::Num(n) => Ok(Value::Num(*n)),
            Expr::Str(s) => self.string(s.clone()),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::None => Ok(Value::None),
            Expr::Name(name) => self.lookup(name),
            Expr::List(items) => {
                let items = self.eval_all(items)?;
                self.charge(1 + items.len())?;
                self.sized(Value::List(items))
            }
            Expr::Tuple(items) => {
                let items = self.eval_all(items)?;
                self.charge(1 + items.len())?;
                self.sized(Value::Tuple(items))
            }
            Expr::Dict(entries) => {
                let mut out = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    out.push((self.eval(k)?, self.eval(v)?));
                }
                self.charge(1 + 2 * out.len())?;
                self.sized(Value::Dict(out))
            }
            Expr::Attr(obj, name) => {
                let obj = self.eval(obj)?;
                attribute(&obj, name)
            }
            Expr::Index(obj, index) => {
                let obj = self.eval(obj)?;
                let index = self.eval(index)?;
                let item = subscript(obj, &index)?;
                self.charge(weight(&item))?;
                Ok(item)
            }
            Expr::Call { func, args, kwargs } => {
                let pos = self.eval_all(args)?;
                let mut kw = Vec::with_capacity(kwargs.len());
                for (name, value) in kwargs {
                    kw.push((name.clone(), self.eval(value)?));
                }
                let result = self.call(func, Args { pos, kw })?;
                self.charge(weight(&result))?;
                Ok(result)
            }
            Expr::Neg(inner) => match self.eval(inner)? {
                Value::Num(n) => Ok(Value::Num(-n)),
                Value::Array(nums) => Ok(Value::Array(nums.into_iter().map(|n| -n).collect())),
                _ => Err(reject("unary '-' needs a number")),
            },
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                let value = match binary(op, left, right)? {
                    Value::Str(s) => self.string(s)?,
                    other => self.sized(other)?,
                };
                self.charge(weight(&value))?;
                Ok(value)
            }
        }
    }

    fn eval_all(&mut self, exprs: &[Expr]) -> AppResult<Vec<Value>> {
        exprs.iter().map(|e| self.eval(e)).collect()
    }

    /// Copy of a bound value, paid for before it is made.
    fn lookup(&mut self, name: &str) -> AppResult<Value> {
        let cost = self
            .env
            .get(name)
            .map(weight)
            .ok_or_else(|| reject(format!("name '{}' is not defined", name)))?;
        self.charge(cost)?;
        self.env
            .get(name)
            .cloned()
            .ok_or_else(|| reject(format!("name '{}' is not defined", name)))
    }

    fn charge(&mut self, nodes: usize) -> AppResult<()> {
        self.cancel.check()?;
        self.nodes = self.nodes.saturating_add(nodes);
        if self.nodes > self.max_nodes {
            return Err(reject(format!(
                "program builds more than {} values",
                self.max_nodes
            )));
        }
        Ok(())
    }

    fn string(&self, s: String) -> AppResult<Value> {
        if s.chars().count() > MAX_STRING_CHARS {
            return Err(reject("string literal too long"));
        }
        Ok(Value::Str(s))
    }

    fn sized(&self, value: Value) -> AppResult<Value> {
        let len = match &value {
            Value::List(items) | Value::Tuple(items) => items.len(),
            Value::Array(nums) => nums.len(),
            Value::Dict(entries) => entries.len(),
            _ => 0,
        };
        if len > self.max_points {
            return Err(reject(format!(
                "sequence of {} items exceeds the {} point limit",
                len, self.max_points
            )));
        }
        Ok(value)
    }

    fn call(&mut self, func: &Expr, args: Args) -> AppResult<Value> {
        match func {
            Expr::Name(name) if !self.env.contains_key(name) => self.builtin(name, args),
            Expr::Name(name) => Err(reject(format!("'{}' is not callable", name))),
            Expr::Attr(obj, method) => {
                let target = self.eval(obj)?;
                self.method(target, method, args)
            }
            _ => Err(reject("unsupported call expression")),
        }
    }

    fn method(&mut self, target: Value, method: &str, args: Args) -> AppResult<Value> {
        match target {
            Value::Module(Module::Pyplot) => self.pyplot(method, args),
            Value::Module(Module::Seaborn) => self.seaborn(method, args),
            Value::Module(Module::Numpy) => self.numpy(method, args),
            Value::Module(Module::Matplotlib) | Value::Module(Module::Style) if method == "use" => {
                Ok(Value::None)
            }
            Value::Axes(panel) => self.axes(panel, method, args),
            Value::Figure => self.figure(method, args),
            Value::List(items) if method == "flatten" || method == "ravel" => {
                Ok(Value::List(flatten(items)))
            }
            Value::Array(nums) if method == "tolist" => {
                Ok(Value::List(nums.into_iter().map(Value::Num).collect()))
            }
            other => Err(reject(format!(
                "method '{}' is not allowed on {}",
                method,
                type_name(&other)
            ))),
        }
    }

    fn pyplot(&mut self, method: &str, args: Args) -> AppResult<Value> {
        let panel = self.current;
        match method {
            "figure" => {
                self.chart = ChartSpec::default();
                self.current = 0;
                Ok(Value::Figure)
            }
            "subplots" => self.subplots(&args),
            "subplot" => self.subplot(&args),
            "gca" => Ok(Value::Axes(self.current)),
            "gcf" => Ok(Value::Figure),
            "suptitle" => {
                self.chart.title = Some(text(args.require(0, "t", method)?)?);
                Ok(Value::Artist)
            }
            "title" => self.set_label(panel, Label::Title, &args, method),
            "xlabel" => self.set_label(panel, Label::X, &args, method),
            "ylabel" => self.set_label(panel, Label::Y, &args, method),
            "savefig" | "imsave" | "imread" => Err(reject(format!("plt.{} is not allowed", method))),
            m if is_cosmetic(m) => Ok(Value::None),
            m => self.plot(panel, m, &args, "plt"),
        }
    }

    fn axes(&mut self, panel: usize, method: &str, args: Args) -> AppResult<Value> {
        match method {
            "set_title" => self.set_label(panel, Label::Title, &args, method),
            "set_xlabel" => self.set_label(panel, Label::X, &args, method),
            "set_ylabel" => self.set_label(panel, Label::Y, &args, method),
            "set" => {
                for (key, label) in [("title", Label::Title), ("xlabel", Label::X), ("ylabel", Label::Y)] {
                    if let Some(v) = args.kw(key) {
                        self.label_mut(panel, label)?.replace(text(v)?);
                    }
                }
                Ok(Value::None)
            }
            "savefig" => Err(reject("savefig is not allowed")),
            m if is_cosmetic(m) || m.starts_with("set_") => Ok(Value::None),
            m => self.plot(panel, m, &args, "ax"),
        }
    }

    fn figure(&mut self, method: &str, args: Args) -> AppResult<Value> {
        match method {
            "suptitle" => {
                self.chart.title = Some(text(args.require(0, "t", method)?)?);
                Ok(Value::Artist)
            }
            "add_subplot" => self.subplot(&args),
            "gca" => Ok(Value::Axes(self.current)),
            "savefig" => Err(reject("savefig is not allowed")),
            "tight_layout" | "set_size_inches" | "subplots_adjust" | "set_facecolor"
            | "autofmt_xdate" | "set_dpi" => Ok(Value::None),
            m => Err(reject(format!("fig.{} is not supported", m))),
        }
    }

    fn seaborn(&mut self, method: &str, args: Args) -> AppResult<Value> {
        match method {
            "set" | "set_theme" | "set_style" | "set_palette" | "set_context" | "despine"
            | "color_palette" => return Ok(Value::None),
            "barplot" | "lineplot" | "scatterplot" | "histplot" => {}
            m => return Err(reject(format!("sns.{} is not supported", m))),
        }

        let panel = match args.kw("ax") {
            Some(Value::Axes(i)) => *i,
            Some(_) => return Err(reject("ax must be an Axes")),
            None => self.current,
        };
        let data = args.kw("data").or_else(|| match args.pos.first() {
            Some(v @ Value::Dict(_)) => Some(v),
            _ => None,
        });
        let positional_xy = !matches!(args.pos.first(), Some(Value::Dict(_)));
        let column = |index: usize, name: &str| -> AppResult<Option<Value>> {
            let raw = match args.kw(name) {
                Some(v) => Some(v),
                None if positional_xy => args.pos.get(index),
                None => None,
            };
            match (raw, data) {
                (Some(Value::Str(key)), Some(Value::Dict(entries))) => entries
                    .iter()
                    .find(|(k, _)| *k == Value::Str(key.clone()))
                    .map(|(_, v)| Some(v.clone()))
                    .ok_or_else(|| reject(format!("data has no column '{}'", key))),
                (Some(v), _) => Ok(Some(v.clone())),
                (None, _) => Ok(None),
            }
        };
        let x = column(0, "x")?;
        let y = column(1, "y")?;

        let series = match method {
            "barplot" => {
                let orient = args.kw("orient").map(text).transpose()?;
                let horizontal = match (&x, &y, orient.as_deref()) {
                    (_, _, Some("h")) | (_, _, Some("y")) => true,
                    (Some(x), Some(y), None) => numbers(x).is_ok() && numbers(y).is_err(),
                    _ => false,
                };
                match (x, y) {
                    (Some(x), Some(y)) if horizontal => bar_series(ChartKind::HorizontalBar, &y, &x)?,
                    (Some(x), Some(y)) => bar_series(ChartKind::Bar, &x, &y)?,
                    (None, Some(values)) | (Some(values), None) => {
                        Series::new(ChartKind::Bar, Vec::new(), numbers(&values)?)
                    }
                    (None, None) => return Err(reject("sns.barplot needs x or y")),
                }
            }
            "lineplot" | "scatterplot" => {
                let kind = if method == "lineplot" {
                    ChartKind::Line
                } else {
                    ChartKind::Scatter
                };
                match (x, y) {
                    (Some(x), Some(y)) => xy_series(kind, &x, &y)?,
                    (None, Some(v)) | (Some(v), None) => Series::new(kind, Vec::new(), numbers(&v)?),
                    (None, None) => return Err(reject(format!("sns.{} needs data", method))),
                }
            }
            _ => {
                let values = match (x, data) {
                    (Some(v), _) => v,
                    (None, Some(v)) => v.clone(),
                    (None, None) => return Err(reject("sns.histplot needs data")),
                };
                Series::new(ChartKind::Histogram, Vec::new(), numbers(&values)?)
                    .with_bins(bins(args.kw("bins"))?)
            }
        };

        self.add_series(panel, series)
    }

    fn numpy(&mut self, method: &str, args: Args) -> AppResult<Value> {
        match method {
            "array" | "asarray" => {
                let v = args.require(0, "object", method)?;
                match numbers(v) {
                    Ok(nums) => Ok(Value::Array(nums)),
                    Err(_) => match v {
                        Value::List(items) | Value::Tuple(items) => Ok(Value::List(items.clone())),
                        _ => Err(reject("np.array needs a sequence")),
                    },
                }
            }
            "arange" => {
                let nums: Vec<f64> = args.pos.iter().map(number).collect::<AppResult<_>>()?;
                let (start, stop, step) = match nums.as_slice() {
                    [stop] => (0.0, *stop, 1.0),
                    [start, stop] => (*start, *stop, 1.0),
                    [start, stop, step] => (*start, *stop, *step),
                    _ => return Err(reject("np.arange takes 1 to 3 numbers")),
                };
                self.sized(Value::Array(arange(start, stop, step, self.max_points)?))
            }
            "linspace" => {
                let start = number(args.require(0, "start", method)?)?;
                let stop = number(args.require(1, "stop", method)?)?;
                let num = args.get(2, "num").map(count).transpose()?.unwrap_or(50);
                if num > self.max_points {
                    return Err(reject("np.linspace exceeds the point limit"));
                }
                let step = if num > 1 {
                    (stop - start) / (num - 1) as f64
                } else {
                    0.0
                };
                Ok(Value::Array((0..num).map(|i| start + step * i as f64).collect()))
            }
            "sum" => Ok(Value::Num(numbers(args.require(0, "a", method)?)?.iter().sum())),
            "mean" => {
                let nums = numbers(args.require(0, "a", method)?)?;
                if nums.is_empty() {
                    return Err(reject("mean of empty sequence"));
                }
                Ok(Value::Num(nums.iter().sum::<f64>() / nums.len() as f64))
            }
            m => Err(reject(format!("np.{} is not supported", m))),
        }
    }

    fn builtin(&mut self, name: &str, args: Args) -> AppResult<Value> {
        let first = || args.require(0, "x", name);
        match name {
            "print" => Ok(Value::None),
            "len" => match first()? {
                Value::List(items) | Value::Tuple(items) => Ok(Value::Num(items.len() as f64)),
                Value::Array(nums) => Ok(Value::Num(nums.len() as f64)),
                Value::Dict(entries) => Ok(Value::Num(entries.len() as f64)),
                Value::Str(s) => Ok(Value::Num(s.chars().count() as f64)),
                other => Err(reject(format!("len() of {}", type_name(other)))),
            },
            "sum" => Ok(Value::Num(numbers(first()?)?.iter().sum())),
            "min" | "max" => {
                let nums = if args.pos.len() == 1 {
                    numbers(first()?)?
                } else {
                    args.pos.iter().map(number).collect::<AppResult<_>>()?
                };
                let pick: fn(f64, f64) -> f64 = if name == "min" { f64::min } else { f64::max };
                nums.into_iter()
                    .reduce(pick)
                    .map(Value::Num)
                    .ok_or_else(|| reject(format!("{}() of empty sequence", name)))
            }
            "abs" => Ok(Value::Num(number(first()?)?.abs())),
            "round" => {
                let x = number(first()?)?;
                let digits = args.get(1, "ndigits").map(number).transpose()?.unwrap_or(0.0);
                let scale = 10f64.powi(digits as i32);
                Ok(Value::Num((x * scale).round() / scale))
            }
            "float" => Ok(Value::Num(parse_number(first()?)?)),
            "int" => Ok(Value::Num(parse_number(first()?)?.trunc())),
            "str" => self.string(display(first()?)?),
            "list" => match first()? {
                Value::List(items) | Value::Tuple(items) => Ok(Value::List(items.clone())),
                Value::Array(nums) => Ok(Value::List(nums.iter().copied().map(Value::Num).collect())),
                Value::Dict(entries) => Ok(Value::List(entries.iter().map(|(k, _)| k.clone()).collect())),
                other => Err(reject(format!("list() of {}", type_name(other)))),
            },
            "range" => {
                let nums: Vec<f64> = args.pos.iter().map(number).collect::<AppResult<_>>()?;
                let (start, stop, step) = match nums.as_slice() {
                    [stop] => (0.0, *stop, 1.0),
                    [start, stop] => (*start, *stop, 1.0),
                    [start, stop, step] => (*start, *stop, *step),
                    _ => return Err(reject("range() takes 1 to 3 numbers")),
                };
                let items = arange(start, stop, step, self.max_points)?;
                Ok(Value::List(items.into_iter().map(Value::Num).collect()))
            }
            "sorted" => {
                let reverse = matches!(args.kw("reverse"), Some(Value::Bool(true)));
                let mut items = match first()? {
                    Value::List(items) | Value::Tuple(items) => items.clone(),
                    Value::Array(nums) => nums.iter().copied().map(Value::Num).collect(),
                    other => return Err(reject(format!("sorted() of {}", type_name(other)))),
                };
                if let Ok(mut nums) = numbers(&Value::List(items.clone())) {
                    nums.sort_by(f64::total_cmp);
                    items = nums.into_iter().map(Value::Num).collect();
                } else {
                    let mut strs = items
                        .iter()
                        .map(|v| match v {
                            Value::Str(s) => Ok(s.clone()),
                            _ => Err(reject("sorted() needs numbers or strings")),
                        })
                        .collect::<AppResult<Vec<_>>>()?;
                    strs.sort();
                    items = strs.into_iter().map(Value::Str).collect();
                }
                if reverse {
                    items.reverse();
                }
                Ok(Value::List(items))
            }
            other => Err(reject(format!("function '{}' is not allowed", other))),
        }
    }

    fn subplots(&mut self, args: &Args) -> AppResult<Value> {
        let rows = args.get(0, "nrows").map(count).transpose()?.unwrap_or(1);
        let cols = args.get(1, "ncols").map(count).transpose()?.unwrap_or(1);
        let n = grid_size(rows, cols)?;

        self.chart = ChartSpec {
            title: None,
            rows,
            cols,
            panels: vec![Panel::default(); n],
        };
        self.current = 0;

        let axes = if n == 1 {
            Value::Axes(0)
        } else if rows == 1 || cols == 1 {
            Value::List((0..n).map(Value::Axes).collect())
        } else {
            Value::List(
                (0..rows)
                    .map(|r| Value::List((0..cols).map(|c| Value::Axes(r * cols + c)).collect()))
                    .collect(),
            )
        };
        Ok(Value::Tuple(vec![Value::Figure, axes]))
    }

    /// `subplot(nrows, ncols, index)` or the three-digit form `subplot(121)`.
    fn subplot(&mut self, args: &Args) -> AppResult<Value> {
        let (rows, cols, index) = match args.pos.as_slice() {
            [] => (1, 1, 1),
            [code] => {
                let code = count(code)?;
                (code / 100, (code / 10) % 10, code % 10)
            }
            [r, c, i, ..] => (count(r)?, count(c)?, count(i)?),
            _ => return Err(reject("subplot() needs nrows, ncols and index")),
        };
        let n = grid_size(rows, cols)?;
        if index == 0 || index > n {
            return Err(reject(format!("subplot index {} out of range", index)));
        }

        if self.chart.rows != rows || self.chart.cols != cols {
            self.chart.rows = rows;
            self.chart.cols = cols;
            self.chart.panels.resize_with(n, Panel::default);
        }
        self.current = index - 1;
        Ok(Value::Axes(self.current))
    }

    fn plot(&mut self, panel: usize, method: &str, args: &Args, owner: &str) -> AppResult<Value> {
        let series = match method {
            "bar" => bar_series(
                ChartKind::Bar,
                args.require(0, "x", method)?,
                args.require(1, "height", method)?,
            )?,
            "barh" => bar_series(
                ChartKind::HorizontalBar,
                args.require(0, "y", method)?,
                args.require(1, "width", method)?,
            )?,
            "plot" => {
                let data: Vec<&Value> = args
                    .pos
                    .iter()
                    .filter(|v| !matches!(v, Value::Str(_)))
                    .collect();
                match data.as_slice() {
                    [y] => Series::new(ChartKind::Line, Vec::new(), numbers(y)?),
                    [x, y] => xy_series(ChartKind::Line, x, y)?,
                    _ => return Err(reject("plot() takes one x and one y series")),
                }
            }
            "scatter" => xy_series(
                ChartKind::Scatter,
                args.require(0, "x", method)?,
                args.require(1, "y", method)?,
            )?,
            "pie" => {
                let values = numbers(args.require(0, "x", method)?)?;
                if values.iter().any(|v| *v < 0.0) {
                    return Err(reject("pie values must be non-negative"));
                }
                let labels = match args.kw("labels") {
                    Some(v) => labels(v)?,
                    None => Vec::new(),
                };
                if !labels.is_empty() && labels.len() != values.len() {
                    return Err(reject("pie labels and values differ in length"));
                }
                Series::new(ChartKind::Pie, labels, values)
            }
            "hist" => Series::new(ChartKind::Histogram, Vec::new(), numbers(args.require(0, "x", method)?)?)
                .with_bins(bins(args.get(1, "bins"))?),
            m => return Err(reject(format!("{}.{} is not supported", owner, m))),
        };

        self.add_series(panel, series)
    }

    fn add_series(&mut self, panel: usize, series: Series) -> AppResult<Value> {
        self.points += series.points();
        if self.points > self.max_points {
            return Err(reject(format!(
                "chart exceeds the {} point limit",
                self.max_points
            )));
        }

        let target = self
            .chart
            .panels
            .get_mut(panel)
            .ok_or_else(|| reject("axes no longer exist"))?;
        target.series.push(series);
        Ok(Value::Artist)
    }

    fn set_label(&mut self, panel: usize, label: Label, args: &Args, call: &str) -> AppResult<Value> {
        let value = text(args.require(0, "label", call)?)?;
        self.label_mut(panel, label)?.replace(value);
        Ok(Value::Artist)
    }

    fn label_mut(&mut self, panel: usize, label: Label) -> AppResult<&mut Option<String>> {
        let panel = self
            .chart
            .panels
            .get_mut(panel)
            .ok_or_else(|| reject("axes no longer exist"))?;
        Ok(match label {
            Label::Title => &mut panel.title,
            Label::X => &mut panel.x_label,
            Label::Y => &mut panel.y_label,
        })
    }
}

#[derive(Clone, Copy)]
enum Label {
    Title,
    X,
    Y,
}

fn resolve_import(module: &str, alias: Option<&str>) -> AppResult<(String, Module)> {
    let value = match module {
        "matplotlib" => Module::Matplotlib,
        "matplotlib.pyplot" if alias.is_some() => Module::Pyplot,
        // `import matplotlib.pyplot` binds the package name.
        "matplotlib.pyplot" => Module::Matplotlib,
        "seaborn" => Module::Seaborn,
        "numpy" => Module::Numpy,
        other => return Err(reject(format!("import of '{}' is not allowed", other))),
    };
    let bound = match alias {
        Some(a) => a.to_string(),
        None => module.split('.').next().unwrap_or(module).to_string(),
    };
    Ok((bound, value))
}

fn attribute(obj: &Value, name: &str) -> AppResult<Value> {
    match (obj, name) {
        (Value::Module(Module::Matplotlib), "pyplot") => Ok(Value::Module(Module::Pyplot)),
        (Value::Module(Module::Pyplot), "style") => Ok(Value::Module(Module::Style)),
        _ => Err(reject(format!(
            "attribute '{}' of {} is not allowed",
            name,
            type_name(obj)
        ))),
    }
}

fn subscript(obj: Value, index: &Value) -> AppResult<Value> {
    let position = |len: usize| -> AppResult<usize> {
        let i = number(index)?;
        if i.fract() != 0.0 {
            return Err(reject("index must be an integer"));
        }
        let i = if i < 0.0 { len as f64 + i } else { i };
        if i < 0.0 || i >= len as f64 {
            return Err(reject("index out of range"));
        }
        Ok(i as usize)
    };

    match obj {
        Value::List(items) | Value::Tuple(items) => {
            let i = position(items.len())?;
            Ok(items[i].clone())
        }
        Value::Array(nums) => {
            let i = position(nums.len())?;
            Ok(Value::Num(nums[i]))
        }
        Value::Dict(entries) => entries
            .into_iter()
            .find(|(k, _)| k == index)
            .map(|(_, v)| v)
            .ok_or_else(|| reject("key not found")),
        other => Err(reject(format!("{} is not subscriptable", type_name(&other)))),
    }
}

fn binary(op: &BinOp, left: Value, right: Value) -> AppResult<Value> {
    match (left, right) {
        (Value::Num(a), Value::Num(b)) => Ok(Value::Num(arith(op, a, b)?)),
        (Value::Array(a), Value::Num(b)) => Ok(Value::Array(
            a.into_iter().map(|x| arith(op, x, b)).collect::<AppResult<_>>()?,
        )),
        (Value::Num(a), Value::Array(b)) => Ok(Value::Array(
            b.into_iter().map(|y| arith(op, a, y)).collect::<AppResult<_>>()?,
        )),
        (Value::Array(a), Value::Array(b)) => {
            if a.len() != b.len() {
                return Err(reject("arrays differ in length"));
            }
            Ok(Value::Array(
                a.into_iter()
                    .zip(b)
                    .map(|(x, y)| arith(op, x, y))
                    .collect::<AppResult<_>>()?,
            ))
        }
        (Value::Str(mut a), Value::Str(b)) if *op == BinOp::Add => {
            a.push_str(&b);
            Ok(Value::Str(a))
        }
        (Value::List(mut a), Value::List(b)) if *op == BinOp::Add => {
            a.extend(b);
            Ok(Value::List(a))
        }
        (a, b) => Err(reject(format!(
            "unsupported operands {} and {}",
            type_name(&a),
            type_name(&b)
        ))),
    }
}

fn arith(op: &BinOp, a: f64, b: f64) -> AppResult<f64> {
    match op {
        BinOp::Add => Ok(a + b),
        BinOp::Sub => Ok(a - b),
        BinOp::Mul => Ok(a * b),
        BinOp::Div | BinOp::Mod if b == 0.0 => Err(reject("division by zero")),
        BinOp::Div => Ok(a / b),
        BinOp::Mod => Ok(a - b * (a / b).floor()),
    }
}

fn arange(start: f64, stop: f64, step: f64, limit: usize) -> AppResult<Vec<f64>> {
    if step == 0.0 {
        return Err(reject("step must not be zero"));
    }
    let n = ((stop - start) / step).ceil().max(0.0);
    if n > limit as f64 {
        return Err(reject(format!("range exceeds the {} point limit", limit)));
    }
    Ok((0..n as usize).map(|i| start + step * i as f64).collect())
}

/// Nodes in a value, nested items included. Strings count one per 16 bytes.
fn weight(value: &Value) -> usize {
    match value {
        Value::List(items) | Value::Tuple(items) => 1 + items.iter().map(weight).sum::<usize>(),
        Value::Array(nums) => 1 + nums.len(),
        Value::Dict(entries) => {
            1 + entries
                .iter()
                .map(|(k, v)| weight(k) + weight(v))
                .sum::<usize>()
        }
        Value::Str(s) => 1 + s.len() / 16,
        _ => 1,
    }
}

fn grid_size(rows: usize, cols: usize) -> AppResult<usize> {
    let n = rows * cols;
    if n == 0 || n > MAX_PANELS {
        return Err(reject(format!("a {}x{} grid is not supported", rows, cols)));
    }
    Ok(n)
}

fn flatten(items: Vec<Value>) -> Vec<Value> {
    items
        .into_iter()
        .flat_map(|v| match v {
            Value::List(inner) => flatten(inner),
            other => vec![other],
        })
        .collect()
}

fn is_cosmetic(method: &str) -> bool {
    matches!(
        method,
        "show"
            | "close"
            | "legend"
            | "grid"
            | "tight_layout"
            | "xticks"
            | "yticks"
            | "xlim"
            | "ylim"
            | "axis"
            | "margins"
            | "subplots_adjust"
            | "text"
            | "annotate"
            | "axhline"
            | "axvline"
            | "bar_label"
            | "tick_params"
            | "invert_xaxis"
            | "invert_yaxis"
            | "minorticks_on"
            | "ticklabel_format"
            | "label_outer"
            | "colorbar"
            | "box"
    )
}

fn bins(value: Option<&Value>) -> AppResult<usize> {
    let n = match value {
        None => DEFAULT_BINS,
        Some(Value::List(edges)) | Some(Value::Tuple(edges)) => edges.len().saturating_sub(1),
        Some(v) => count(v)?,
    };
    if n == 0 || n > MAX_BINS {
        return Err(reject(format!("bins must be between 1 and {}", MAX_BINS)));
    }
    Ok(n)
}

fn bar_series(kind: ChartKind, categories: &Value, heights: &Value) -> AppResult<Series> {
    let labels = labels(categories)?;
    let values = match heights {
        Value::Num(h) => vec![*h; labels.len()],
        other => numbers(other)?,
    };
    if labels.len() != values.len() {
        return Err(reject(format!(
            "{} labels but {} values",
            labels.len(),
            values.len()
        )));
    }
    Ok(Series::new(kind, labels, values))
}

fn xy_series(kind: ChartKind, x: &Value, y: &Value) -> AppResult<Series> {
    let values = numbers(y)?;
    let series = match numbers(x) {
        Ok(xs) => {
            if xs.len() != values.len() {
                return Err(reject("x and y differ in length"));
            }
            Series::new(kind, Vec::new(), values).with_xs(xs)
        }
        Err(_) => {
            let labels = labels(x)?;
            if labels.len() != values.len() {
                return Err(reject("x and y differ in length"));
            }
            Series::new(kind, labels, values)
        }
    };
    Ok(series)
}

fn items(value: &Value) -> AppResult<Vec<Value>> {
    match value {
        Value::List(items) | Value::Tuple(items) => Ok(items.clone()),
        Value::Array(nums) => Ok(nums.iter().copied().map(Value::Num).collect()),
        other => Err(reject(format!("expected a sequence, got {}", type_name(other)))),
    }
}

fn numbers(value: &Value) -> AppResult<Vec<f64>> {
    items(value)?.iter().map(number).collect()
}

fn labels(value: &Value) -> AppResult<Vec<String>> {
    items(value)?.iter().map(display).collect()
}

fn number(value: &Value) -> AppResult<f64> {
    match value {
        Value::Num(n) if n.is_finite() => Ok(*n),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        other => Err(reject(format!("expected a number, got {}", type_name(other)))),
    }
}

fn count(value: &Value) -> AppResult<usize> {
    let n = number(value)?;
    if n < 0.0 || n.fract() != 0.0 {
        return Err(reject("expected a non-negative integer"));
    }
    Ok(n as usize)
}

/// `float()`/`int()` argument: a number or numeric text such as "$1,200".
fn parse_number(value: &Value) -> AppResult<f64> {
    match value {
        Value::Str(s) => {
            let cleaned: String = s
                .trim()
                .chars()
                .filter(|c| !matches!(c, '$' | ',' | '%' | '_'))
                .collect();
            cleaned
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .ok_or_else(|| reject(format!("cannot convert '{}' to a number", s)))
        }
        other => number(other),
    }
}

fn text(value: &Value) -> AppResult<String> {
    display(value)
}

fn display(value: &Value) -> AppResult<String> {
    match value {
        Value::Str(s) => Ok(s.clone()),
        Value::Num(n) => Ok(format_number(*n)),
        Value::Bool(true) => Ok("True".to_string()),
        Value::Bool(false) => Ok("False".to_string()),
        Value::None => Ok("None".to_string()),
        other => Err(reject(format!("expected text, got {}", type_name(other)))),
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::None => "None",
        Value::Bool(_) => "bool",
        Value::Num(_) => "number",
        Value::Str(_) => "str",
        Value::List(_) => "list",
        Value::Tuple(_) => "tuple",
        Value::Array(_) => "array",
        Value::Dict(_) => "dict",
        Value::Module(_) => "module",
        Value::Figure => "Figure",
        Value::Axes(_) => "Axes",
        Value::Artist => "artist",
    }
}

#[cfg(test)]
mod tests {
    use super::super::{lexer::tokenize, parser::parse};
    use super::*;

    fn run(src: &str) -> AppResult<ChartSpec> {
        let program = parse(tokenize(src)?, 256)?;
        Interpreter::new(10_000).run(&program)
    }

    #[test]
    fn test_minimal_bar_chart() {
        let spec = run("labels=[\"A\",\"B\"]; values=[1,2]\nplt.bar(labels, values)").unwrap();
        assert_eq!(spec.panels.len(), 1);
        let series = &spec.panels[0].series[0];
        assert_eq!(series.kind, ChartKind::Bar);
        assert_eq!(series.labels, vec!["A", "B"]);
        assert_eq!(series.values, vec![1.0, 2.0]);
    }

    #[test]
    fn test_titles_and_labels() {
        let spec = run(
            "import matplotlib.pyplot as plt\nplt.plot([1, 2, 3], [4, 5, 6], 'o-')\nplt.title('Sales')\nplt.xlabel('Month')\nplt.ylabel('Units')\nplt.show()",
        )
        .unwrap();
        let panel = &spec.panels[0];
        assert_eq!(panel.title.as_deref(), Some("Sales"));
        assert_eq!(panel.x_label.as_deref(), Some("Month"));
        assert_eq!(panel.y_label.as_deref(), Some("Units"));
        assert_eq!(panel.series[0].xs.as_deref(), Some(&[1.0, 2.0, 3.0][..]));
    }

    #[test]
    fn test_subplots_and_axes() {
        let spec = run(
            "import matplotlib.pyplot as plt\nfig, (ax1, ax2) = plt.subplots(1, 2)\nax1.pie([30, 70], labels=['a', 'b'])\nax2.barh(['x', 'y'], [3, 4])\nax2.set_title('Right')\nfig.suptitle('Both')",
        )
        .unwrap();
        assert_eq!((spec.rows, spec.cols), (1, 2));
        assert_eq!(spec.title.as_deref(), Some("Both"));
        assert_eq!(spec.kinds(), vec![ChartKind::Pie, ChartKind::HorizontalBar]);
        assert_eq!(spec.panels[1].title.as_deref(), Some("Right"));
    }

    #[test]
    fn test_seaborn_barplot_with_dict_data() {
        let spec = run(
            "import seaborn as sns\ndata = {'Region': ['N', 'S'], 'Sales': [10, 20]}\nsns.barplot(x='Sales', y='Region', data=data)",
        )
        .unwrap();
        let series = &spec.panels[0].series[0];
        assert_eq!(series.kind, ChartKind::HorizontalBar);
        assert_eq!(series.labels, vec!["N", "S"]);
        assert_eq!(series.values, vec![10.0, 20.0]);
    }

    #[test]
    fn test_numpy_arithmetic() {
        let spec = run(
            "import numpy as np\nimport matplotlib.pyplot as plt\nvalues = np.array([1000, 2500]) / 1000\nplt.bar(['a', 'b'], values)",
        )
        .unwrap();
        assert_eq!(spec.panels[0].series[0].values, vec![1.0, 2.5]);
    }

    #[test]
    fn test_histogram_bins() {
        let spec = run("import matplotlib.pyplot as plt\nplt.hist([1, 2, 2, 3], bins=3)").unwrap();
        assert_eq!(spec.panels[0].series[0].bins, Some(3));
    }

    #[test]
    fn test_disallowed_capabilities() {
        for src in [
            "import os",
            "import subprocess as sp",
            "from matplotlib import cm",
            "open('x.txt')",
            "exec('print(1)')",
            "import matplotlib.pyplot as plt\nplt.savefig('out.png')",
            "import matplotlib.pyplot as plt\nplt.cm",
            "import matplotlib.pyplot as plt\nfig = plt.figure()\nfig.savefig('a.png')",
            "x = 'a'\nx.join(['b'])",
            "import matplotlib.pyplot as plt\nplt = 3\nplt.bar([1], [1])",
        ] {
            assert!(
                matches!(run(src), Err(AppError::Sandbox(_))),
                "expected rejection for {:?}",
                src
            );
        }
    }

    #[test]
    fn test_point_limit() {
        let program = parse(
            tokenize("import matplotlib.pyplot as plt\nplt.bar(['a', 'b', 'c'], [1, 2, 3])").unwrap(),
            256,
        )
        .unwrap();
        assert!(matches!(
            Interpreter::new(2).run(&program),
            Err(AppError::Sandbox(_))
        ));
        assert!(matches!(run("x = list(range(20000))"), Err(AppError::Sandbox(_))));
    }

    #[test]
    fn test_string_doubling_is_bounded() {
        let src = format!("s = 'ab'\n{}", "s = s + s\n".repeat(20));
        assert!(matches!(run(&src), Err(AppError::Sandbox(_))));
    }

    #[test]
    fn test_nested_doubling_is_bounded() {
        let src = format!(
            "a = [1]\n{}plt.bar(['x'], [1])",
            "a = [a, a]\n".repeat(34)
        );
        let err = run(&src).unwrap_err();
        assert!(err.to_string().contains("values"), "{}", err);
    }

    #[test]
    fn test_copies_through_names_are_counted() {
        // Each line copies `a` twice; the list itself never grows.
        let src = format!("a = list(range(1000))\n{}", "b = [a, a]\n".repeat(100));
        assert!(matches!(run(&src), Err(AppError::Sandbox(_))));
        assert!(run(&format!(
            "a = list(range(1000))\n{}plt.bar(['x'], [1])",
            "b = [a, a]\n".repeat(5)
        ))
        .is_ok());
    }

    #[test]
    fn test_dict_literal_is_sized() {
        let entries: Vec<String> = (0..3).map(|i| format!("{}: {}", i, i)).collect();
        let program = parse(
            tokenize(&format!("d = {{{}}}", entries.join(", "))).unwrap(),
            256,
        )
        .unwrap();
        assert!(matches!(
            Interpreter::new(2).run(&program),
            Err(AppError::Sandbox(_))
        ));
    }

    #[test]
    fn test_cancelled_run_stops() {
        let program = parse(tokenize("plt.bar(['a'], [1])").unwrap(), 256).unwrap();
        let cancel = CancelFlag::default();
        cancel.cancel();
        let err = Interpreter::new(10_000)
            .with_cancel(cancel)
            .run(&program)
            .unwrap_err();
        assert!(err.to_string().contains("cancelled"), "{}", err);
    }

    #[test]
    fn test_length_mismatch() {
        assert!(run("import matplotlib.pyplot as plt\nplt.bar(['a', 'b'], [1])").is_err());
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(2.0), "2");
        assert_eq!(format_number(2.5), "2.5");
    }
}

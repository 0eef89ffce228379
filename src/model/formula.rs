//! Formula AST attached to computed fields.

use std::fmt;

use crate::error::{CompileError, CompileResult};

/// The fixed catalog of value formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    Get,
    Sum,
    Min,
    Max,
    Avg,
    Count,
    Sub,
    Mul,
    Div,
    RollingDaysAvg,
    RollingDaysSum,
    AvgIfEq,
    CountIfEq,
}

impl FunctionKind {
    pub const ALL: [FunctionKind; 13] = [
        FunctionKind::Get,
        FunctionKind::Sum,
        FunctionKind::Min,
        FunctionKind::Max,
        FunctionKind::Avg,
        FunctionKind::Count,
        FunctionKind::Sub,
        FunctionKind::Mul,
        FunctionKind::Div,
        FunctionKind::RollingDaysAvg,
        FunctionKind::RollingDaysSum,
        FunctionKind::AvgIfEq,
        FunctionKind::CountIfEq,
    ];

    /// Case-sensitive lookup by the name used in model files.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            FunctionKind::Get => "Get",
            FunctionKind::Sum => "Sum",
            FunctionKind::Min => "Min",
            FunctionKind::Max => "Max",
            FunctionKind::Avg => "Avg",
            FunctionKind::Count => "Count",
            FunctionKind::Sub => "Sub",
            FunctionKind::Mul => "Mul",
            FunctionKind::Div => "Div",
            FunctionKind::RollingDaysAvg => "RollingDaysAvg",
            FunctionKind::RollingDaysSum => "RollingDaysSum",
            FunctionKind::AvgIfEq => "AvgIfEq",
            FunctionKind::CountIfEq => "CountIfEq",
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            FunctionKind::Get
            | FunctionKind::Sum
            | FunctionKind::Min
            | FunctionKind::Max
            | FunctionKind::Avg
            | FunctionKind::Count => 1,
            FunctionKind::Sub | FunctionKind::Mul | FunctionKind::Div => 2,
            FunctionKind::RollingDaysAvg
            | FunctionKind::RollingDaysSum
            | FunctionKind::AvgIfEq
            | FunctionKind::CountIfEq => 3,
        }
    }

    /// SQL aggregate applied by the aggregating kinds.
    pub fn aggregate(&self) -> Option<&'static str> {
        match self {
            FunctionKind::Sum | FunctionKind::RollingDaysSum => Some("SUM"),
            FunctionKind::Min => Some("MIN"),
            FunctionKind::Max => Some("MAX"),
            FunctionKind::Avg | FunctionKind::RollingDaysAvg | FunctionKind::AvgIfEq => {
                Some("AVG")
            }
            FunctionKind::Count | FunctionKind::CountIfEq => Some("COUNT"),
            FunctionKind::Get | FunctionKind::Sub | FunctionKind::Mul | FunctionKind::Div => None,
        }
    }
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Functions allowed in a Reference field's `filter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    /// `RefEq(column, refField.remoteField)`: keep candidates whose `column`
    /// equals the value reached through the form's `refField`.
    RefEq,
}

impl FilterKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "RefEq" => Some(FilterKind::RefEq),
            _ => None,
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            FilterKind::RefEq => 2,
        }
    }
}

/// A named operation over an ordered argument list.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub args: Vec<Argument>,
}

impl Function {
    pub fn new(name: impl Into<String>, args: Vec<Argument>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Catalog entry for this function, checking its arity.
    pub fn kind(&self) -> CompileResult<FunctionKind> {
        let kind = FunctionKind::from_name(&self.name)
            .ok_or_else(|| CompileError::UnknownFormula(self.name.clone()))?;
        if self.args.len() != kind.arity() {
            return Err(CompileError::Arity {
                function: self.name.clone(),
                expected: kind.arity(),
                found: self.args.len(),
            });
        }
        Ok(kind)
    }

    pub fn arg(&self, position: usize) -> Option<&Argument> {
        self.args.get(position)
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_str(")")
    }
}

/// One operand of a [`Function`].
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    /// A field of the entity being compiled.
    FieldRef(String),
    /// `via.remote`: a field reached through a relation or a Reference field.
    CrossRef { via: String, remote: String },
    /// A nested formula.
    FuncCall(Function),
}

impl Argument {
    pub fn field(name: impl Into<String>) -> Self {
        Argument::FieldRef(name.into())
    }

    pub fn cross(via: impl Into<String>, remote: impl Into<String>) -> Self {
        Argument::CrossRef {
            via: via.into(),
            remote: remote.into(),
        }
    }

    pub fn call(function: Function) -> Self {
        Argument::FuncCall(function)
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::FieldRef(name) => f.write_str(name),
            Argument::CrossRef { via, remote } => write!(f, "{via}.{remote}"),
            Argument::FuncCall(function) => write!(f, "{function}"),
        }
    }
}

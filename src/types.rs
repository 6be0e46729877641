use std::{fmt::Display, str::FromStr};

use miette::SourceSpan;

use crate::eval::Value;

/// Declared or literal type of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    UInt,
    Float,
    UFloat,
    Bool,
    String,
}

impl FromStr for Type {
    type Err = ();

    fn from_str(word: &str) -> Result<Self, Self::Err> {
        const WORDS: [(&str, Type); 6] = [
            ("int", Type::Int),
            ("uint", Type::UInt),
            ("float", Type::Float),
            ("ufloat", Type::UFloat),
            ("bool", Type::Bool),
            ("string", Type::String),
        ];

        WORDS
            .iter()
            .find(|(name, _)| word.eq_ignore_ascii_case(name))
            .map(|&(_, ty)| ty)
            .ok_or(())
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Int => write!(f, "INT"),
            Type::UInt => write!(f, "UINT"),
            Type::Float => write!(f, "FLOAT"),
            Type::UFloat => write!(f, "UFLOAT"),
            Type::Bool => write!(f, "BOOL"),
            Type::String => write!(f, "STRING"),
        }
    }
}

/// A named slot in the scope.
///
/// `value` stays `None` between `var` and the first `move` into it.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable<'de> {
    pub name: &'de str,
    pub ty: Type,
    pub line: usize,
    pub span: SourceSpan,
    pub value: Option<Value<'de>>,
}

impl<'de> Variable<'de> {
    pub fn declare(name: &'de str, ty: Type, line: usize, span: SourceSpan) -> Self {
        Variable {
            name,
            ty,
            line,
            span,
            value: None,
        }
    }

    /// A variable whose type is taken from the value it is created with.
    pub fn holding(name: &'de str, value: Value<'de>, line: usize, span: SourceSpan) -> Self {
        Variable {
            name,
            ty: value.ty(),
            line,
            span,
            value: Some(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_words_are_case_insensitive() {
        assert_eq!("int".parse::<Type>(), Ok(Type::Int));
        assert_eq!("UFloat".parse::<Type>(), Ok(Type::UFloat));
        assert_eq!("STRING".parse::<Type>(), Ok(Type::String));
        assert_eq!("integer".parse::<Type>(), Err(()));
    }

    #[test]
    fn holding_infers_type_from_value() {
        let var = Variable::holding("x", Value::Float(1.5), 3, (0, 1).into());
        assert_eq!(var.ty, Type::Float);
        assert_eq!(var.value, Some(Value::Float(1.5)));
    }
}

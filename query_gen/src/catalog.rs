//! Operator and function catalog.
//!
//! Every operator, scalar function, aggregate and window function the
//! generator may emit is described by an [`OperatorSignature`] in the static
//! [`CATALOG`]. Lookups by return type drive type-directed generation.

use strum::{Display, EnumIter};

use crate::schema::DataType;

/// Syntactic category of an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Display)]
pub enum OpCategory {
    UnaryPrefix,
    UnaryPostfix,
    Binary,
    Func,
    Aggregate,
    Window,
}

/// Number of arguments an operator takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Fixed(usize),
    /// Any number of arguments, all following the single declared rule.
    Variadic,
}

/// How the type of one argument is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgRule {
    /// Pick uniformly from the listed types.
    Fixed(&'static [DataType]),
    /// Use the type chosen for argument 0. Illegal at position 0.
    SameAsFirst,
    /// Use the type requested for the whole call.
    SameAsReturn,
}

/// Signature of an operator or function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorSignature {
    /// Textual form, e.g. `"IS NOT DISTINCT FROM"` or `"SUBSTR"`.
    pub name: &'static str,
    pub arity: Arity,
    pub category: OpCategory,
    /// Types a call may evaluate to.
    pub returns: &'static [DataType],
    /// One rule per declared argument (exactly one for variadic).
    pub args: &'static [ArgRule],
}

impl OperatorSignature {
    const fn new(name: &'static str, category: OpCategory) -> Self {
        Self {
            name,
            arity: Arity::Fixed(0),
            category,
            returns: &[],
            args: &[],
        }
    }

    const fn prefix(name: &'static str) -> Self {
        Self::new(name, OpCategory::UnaryPrefix)
    }

    const fn postfix(name: &'static str) -> Self {
        Self::new(name, OpCategory::UnaryPostfix)
    }

    const fn binary(name: &'static str) -> Self {
        Self::new(name, OpCategory::Binary)
    }

    const fn func(name: &'static str) -> Self {
        Self::new(name, OpCategory::Func)
    }

    const fn aggregate(name: &'static str) -> Self {
        Self::new(name, OpCategory::Aggregate)
    }

    const fn window(name: &'static str) -> Self {
        Self::new(name, OpCategory::Window)
    }

    /// Set the possible return types.
    const fn returns(mut self, types: &'static [DataType]) -> Self {
        self.returns = types;
        self
    }

    /// Set fixed-arity argument rules.
    const fn args(mut self, rules: &'static [ArgRule]) -> Self {
        self.args = rules;
        self.arity = Arity::Fixed(rules.len());
        self
    }

    /// Make the operator variadic with a single argument rule.
    const fn variadic(mut self, rule: &'static [ArgRule; 1]) -> Self {
        self.args = rule;
        self.arity = Arity::Variadic;
        self
    }

    pub fn is_aggregate(&self) -> bool {
        self.category == OpCategory::Aggregate
    }

    pub fn is_window(&self) -> bool {
        self.category == OpCategory::Window
    }

    pub fn is_function(&self) -> bool {
        self.category == OpCategory::Func
    }

    pub fn can_return(&self, data_type: DataType) -> bool {
        self.returns.contains(&data_type)
    }

    /// Rule for the argument at `pos`. Variadic operators reuse their rule.
    pub fn arg_rule(&self, pos: usize) -> Option<ArgRule> {
        match self.arity {
            Arity::Variadic => self.args.first().copied(),
            Arity::Fixed(_) => self.args.get(pos).copied(),
        }
    }
}

use ArgRule::{Fixed, SameAsFirst, SameAsReturn};

const NUM: &[DataType] = DataType::NUMERIC;
const STR: &[DataType] = &[DataType::String];
const INT: &[DataType] = &[DataType::BigInt];
const DBL: &[DataType] = &[DataType::Double];
const BOOL: &[DataType] = &[DataType::Boolean];
const ANY: &[DataType] = DataType::NON_NULL;
const COUNTABLE: &[DataType] = &[DataType::Boolean, DataType::BigInt, DataType::Double];

const NUM_1: &[ArgRule] = &[Fixed(NUM)];
const NUM_2: &[ArgRule] = &[Fixed(NUM), Fixed(NUM)];
const STR_1: &[ArgRule] = &[Fixed(STR)];
const STR_2: &[ArgRule] = &[Fixed(STR), SameAsFirst];
const STR_3: &[ArgRule] = &[Fixed(STR), Fixed(STR), Fixed(STR)];
const NUM_INT: &[ArgRule] = &[Fixed(NUM), Fixed(INT)];
const STR_INT: &[ArgRule] = &[Fixed(STR), Fixed(INT)];
const ARITH: &[ArgRule] = &[SameAsReturn, SameAsReturn];
const COMPARE: &[ArgRule] = &[Fixed(ANY), SameAsFirst];

// Operators referenced by name from the assembler and oracles.

pub const NOT: OperatorSignature = OperatorSignature::prefix("NOT")
    .returns(BOOL)
    .args(&[Fixed(BOOL)]);
pub const IS_NULL: OperatorSignature = OperatorSignature::postfix("IS NULL")
    .returns(BOOL)
    .args(&[Fixed(ANY)]);
pub const IS_NOT_NULL: OperatorSignature = OperatorSignature::postfix("IS NOT NULL")
    .returns(BOOL)
    .args(&[Fixed(ANY)]);
pub const AND: OperatorSignature = OperatorSignature::binary("AND")
    .returns(BOOL)
    .args(&[Fixed(BOOL), Fixed(BOOL)]);
pub const OR: OperatorSignature = OperatorSignature::binary("OR")
    .returns(BOOL)
    .args(&[Fixed(BOOL), Fixed(BOOL)]);
pub const SUB: OperatorSignature = OperatorSignature::binary("-")
    .returns(NUM)
    .args(ARITH);
pub const GREATER: OperatorSignature = compare(">");
pub const IS_DISTINCT_FROM: OperatorSignature = OperatorSignature::binary("IS DISTINCT FROM")
    .returns(BOOL)
    .args(COMPARE);
pub const IS_NOT_DISTINCT_FROM: OperatorSignature =
    OperatorSignature::binary("IS NOT DISTINCT FROM")
        .returns(BOOL)
        .args(COMPARE);
pub const MIN: OperatorSignature = OperatorSignature::aggregate("MIN")
    .returns(NUM)
    .args(&[SameAsReturn]);
pub const MAX: OperatorSignature = OperatorSignature::aggregate("MAX")
    .returns(NUM)
    .args(&[SameAsReturn]);
pub const SUM: OperatorSignature = OperatorSignature::aggregate("SUM")
    .returns(NUM)
    .args(&[SameAsReturn]);
pub const AVG: OperatorSignature = OperatorSignature::aggregate("AVG")
    .returns(NUM)
    .args(NUM_1);
pub const TOTAL: OperatorSignature = OperatorSignature::aggregate("TOTAL")
    .returns(DBL)
    .args(NUM_1);
pub const COUNT: OperatorSignature = OperatorSignature::aggregate("COUNT")
    .returns(NUM)
    .args(&[Fixed(COUNTABLE)]);

/// `RANDOM()`, used for row sampling. Not part of [`CATALOG`] so it never
/// shows up in generated predicates.
pub const RANDOM: OperatorSignature = OperatorSignature::func("RANDOM").returns(INT);

const fn math1(name: &'static str) -> OperatorSignature {
    OperatorSignature::func(name).returns(NUM).args(NUM_1)
}

const fn math2(name: &'static str) -> OperatorSignature {
    OperatorSignature::func(name).returns(NUM).args(NUM_2)
}

const fn string_op(name: &'static str) -> OperatorSignature {
    OperatorSignature::binary(name).returns(BOOL).args(STR_2)
}

const fn compare(name: &'static str) -> OperatorSignature {
    OperatorSignature::binary(name).returns(BOOL).args(COMPARE)
}

const fn arith(name: &'static str) -> OperatorSignature {
    OperatorSignature::binary(name).returns(NUM).args(ARITH)
}

const fn bitwise(name: &'static str) -> OperatorSignature {
    OperatorSignature::binary(name).returns(NUM).args(NUM_2)
}

const fn shift(name: &'static str) -> OperatorSignature {
    OperatorSignature::binary(name).returns(NUM).args(NUM_INT)
}

const fn str_fn1(name: &'static str, returns: &'static [DataType]) -> OperatorSignature {
    OperatorSignature::func(name).returns(returns).args(STR_1)
}

const fn str_fn2(name: &'static str, returns: &'static [DataType]) -> OperatorSignature {
    OperatorSignature::func(name).returns(returns).args(STR_2)
}

/// All operators and functions available for generation.
///
/// Entries are limited to syntax and functions SQLite accepts, so checks are
/// not lost to parse errors.
pub static CATALOG: &[OperatorSignature] = &[
    // =========================================================================
    // Unary operators
    // =========================================================================
    IS_NULL,
    IS_NOT_NULL,
    NOT,
    OperatorSignature::prefix("+").returns(NUM).args(&[SameAsReturn]),
    OperatorSignature::prefix("-").returns(NUM).args(&[SameAsReturn]),
    OperatorSignature::prefix("~").returns(NUM).args(NUM_1),
    // =========================================================================
    // Arithmetic and bitwise
    // =========================================================================
    arith("+"),
    SUB,
    arith("*"),
    arith("/"),
    arith("%"),
    bitwise("&"),
    bitwise("|"),
    shift("<<"),
    shift(">>"),
    // =========================================================================
    // Comparisons
    // =========================================================================
    compare("="),
    compare("=="),
    compare("!="),
    compare("<>"),
    compare("<"),
    compare("<="),
    GREATER,
    compare(">="),
    compare("IS"),
    compare("IS NOT"),
    IS_DISTINCT_FROM,
    IS_NOT_DISTINCT_FROM,
    // =========================================================================
    // String operators
    // =========================================================================
    string_op("LIKE"),
    string_op("NOT LIKE"),
    string_op("GLOB"),
    string_op("NOT GLOB"),
    OperatorSignature::binary("||").returns(STR).args(STR_2),
    // =========================================================================
    // Logical
    // =========================================================================
    AND,
    OR,
    // =========================================================================
    // Math functions
    // =========================================================================
    math1("ABS"),
    math1("ACOS"),
    math1("ACOSH"),
    math1("ASIN"),
    math1("ASINH"),
    math1("ATAN"),
    math1("ATANH"),
    math1("CEIL"),
    math1("CEILING"),
    math1("COS"),
    math1("COSH"),
    math1("DEGREES"),
    math1("EXP"),
    math1("FLOOR"),
    math1("LN"),
    math1("LOG"),
    math1("LOG10"),
    math1("LOG2"),
    math1("RADIANS"),
    math1("ROUND"),
    math1("SIGN"),
    math1("SIN"),
    math1("SINH"),
    math1("SQRT"),
    math1("TAN"),
    math1("TANH"),
    math1("TRUNC"),
    math2("ATAN2"),
    math2("MOD"),
    math2("POW"),
    math2("POWER"),
    math2("LOG"),
    OperatorSignature::func("ROUND").returns(NUM).args(NUM_INT),
    OperatorSignature::func("PI").returns(DBL),
    // =========================================================================
    // Null handling and conditionals
    // =========================================================================
    OperatorSignature::func("COALESCE")
        .returns(ANY)
        .variadic(&[SameAsReturn]),
    OperatorSignature::func("NULLIF")
        .returns(ANY)
        .args(&[SameAsReturn, SameAsReturn]),
    OperatorSignature::func("IFNULL")
        .returns(ANY)
        .args(&[SameAsReturn, SameAsReturn]),
    OperatorSignature::func("IIF")
        .returns(ANY)
        .args(&[Fixed(BOOL), SameAsReturn, SameAsReturn]),
    // =========================================================================
    // String functions
    // =========================================================================
    str_fn1("LENGTH", NUM),
    str_fn1("OCTET_LENGTH", NUM),
    str_fn1("UNICODE", NUM),
    str_fn2("INSTR", NUM),
    OperatorSignature::func("CHAR").returns(STR).variadic(&[Fixed(INT)]),
    OperatorSignature::func("HEX").returns(STR).args(&[Fixed(ANY)]),
    OperatorSignature::func("QUOTE").returns(STR).args(&[Fixed(ANY)]),
    OperatorSignature::func("TYPEOF").returns(STR).args(&[Fixed(ANY)]),
    str_fn1("LOWER", STR),
    str_fn1("UPPER", STR),
    str_fn1("TRIM", STR),
    str_fn2("TRIM", STR),
    str_fn1("LTRIM", STR),
    str_fn2("LTRIM", STR),
    str_fn1("RTRIM", STR),
    str_fn2("RTRIM", STR),
    OperatorSignature::func("REPLACE").returns(STR).args(STR_3),
    OperatorSignature::func("CONCAT")
        .returns(STR)
        .variadic(&[Fixed(ANY)]),
    OperatorSignature::func("CONCAT_WS")
        .returns(STR)
        .variadic(&[Fixed(ANY)]),
    OperatorSignature::func("SUBSTR").returns(STR).args(STR_INT),
    OperatorSignature::func("SUBSTR")
        .returns(STR)
        .args(&[Fixed(STR), Fixed(INT), Fixed(INT)]),
    OperatorSignature::func("SUBSTRING").returns(STR).args(STR_INT),
    OperatorSignature::func("SUBSTRING")
        .returns(STR)
        .args(&[Fixed(STR), Fixed(INT), Fixed(INT)]),
    // =========================================================================
    // Aggregates
    // =========================================================================
    MIN,
    MAX,
    AVG,
    SUM,
    TOTAL,
    COUNT,
    // =========================================================================
    // Window functions
    // =========================================================================
    OperatorSignature::window("ROW_NUMBER").returns(INT),
    OperatorSignature::window("RANK").returns(INT),
    OperatorSignature::window("DENSE_RANK").returns(INT),
    OperatorSignature::window("NTILE")
        .returns(INT)
        .args(&[Fixed(INT)]),
    OperatorSignature::window("CUME_DIST").returns(DBL),
    OperatorSignature::window("PERCENT_RANK").returns(DBL),
    OperatorSignature::window("LAG")
        .returns(ANY)
        .args(&[SameAsReturn]),
    OperatorSignature::window("LAG")
        .returns(ANY)
        .args(&[SameAsReturn, Fixed(INT)]),
    OperatorSignature::window("LAG")
        .returns(ANY)
        .args(&[SameAsReturn, Fixed(INT), SameAsReturn]),
    OperatorSignature::window("LEAD")
        .returns(ANY)
        .args(&[SameAsReturn]),
    OperatorSignature::window("LEAD")
        .returns(ANY)
        .args(&[SameAsReturn, Fixed(INT)]),
    OperatorSignature::window("LEAD")
        .returns(ANY)
        .args(&[SameAsReturn, Fixed(INT), SameAsReturn]),
    OperatorSignature::window("FIRST_VALUE")
        .returns(ANY)
        .args(&[SameAsReturn]),
    OperatorSignature::window("LAST_VALUE")
        .returns(ANY)
        .args(&[SameAsReturn]),
    OperatorSignature::window("NTH_VALUE")
        .returns(ANY)
        .args(&[SameAsReturn, Fixed(INT)]),
];

/// Signatures that may evaluate to `data_type`, or every signature for `None`.
pub fn signatures_with_return_type(
    data_type: Option<DataType>,
) -> impl Iterator<Item = &'static OperatorSignature> {
    CATALOG
        .iter()
        .filter(move |sig| data_type.is_none_or(|t| sig.can_return(t)))
}

/// Generation candidates for `data_type`.
///
/// With `drop_functions`, FUNC-category signatures are excluded so that
/// operators and aggregates are not drowned out by the long function list.
pub fn candidates(data_type: DataType, drop_functions: bool) -> Vec<&'static OperatorSignature> {
    signatures_with_return_type(Some(data_type))
        .filter(|sig| !(drop_functions && sig.is_function()))
        .collect()
}

/// First signature named `name`.
pub fn find(name: &str) -> Option<&'static OperatorSignature> {
    CATALOG.iter().find(|sig| sig.name == name)
}

/// All aggregate signatures.
pub fn aggregates() -> impl Iterator<Item = &'static OperatorSignature> {
    CATALOG.iter().filter(|sig| sig.is_aggregate())
}

/// All window-function signatures.
pub fn window_functions() -> impl Iterator<Item = &'static OperatorSignature> {
    CATALOG.iter().filter(|sig| sig.is_window())
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_arg_rules_are_well_formed() {
        for sig in CATALOG.iter().chain([&RANDOM]) {
            assert!(!sig.returns.is_empty(), "{} has no return types", sig.name);
            match sig.arity {
                Arity::Fixed(n) => assert_eq!(n, sig.args.len(), "{}", sig.name),
                Arity::Variadic => assert_eq!(sig.args.len(), 1, "{}", sig.name),
            }
            for (pos, rule) in sig.args.iter().enumerate() {
                match rule {
                    SameAsFirst => assert!(pos > 0, "{} uses SameAsFirst at 0", sig.name),
                    Fixed(types) => assert!(!types.is_empty(), "{} has empty rule", sig.name),
                    SameAsReturn => {}
                }
            }
            if sig.arity == Arity::Variadic {
                assert_ne!(sig.args[0], SameAsFirst, "{}", sig.name);
            }
        }
    }

    #[test]
    fn test_operator_arity_matches_category() {
        for sig in CATALOG {
            match sig.category {
                OpCategory::UnaryPrefix | OpCategory::UnaryPostfix => {
                    assert_eq!(sig.arity, Arity::Fixed(1), "{}", sig.name)
                }
                OpCategory::Binary => assert_eq!(sig.arity, Arity::Fixed(2), "{}", sig.name),
                _ => {}
            }
        }
    }

    #[test]
    fn test_every_type_has_candidates() {
        for ty in DataType::NON_NULL {
            assert!(!candidates(*ty, true).is_empty(), "{ty} without functions");
            assert!(!candidates(*ty, false).is_empty(), "{ty} with functions");
        }
        assert!(candidates(DataType::Null, false).is_empty());
    }

    #[test]
    fn test_boolean_always_has_operators() {
        let bool_ops = candidates(DataType::Boolean, true);
        assert!(bool_ops.iter().all(|sig| !sig.is_function()));
        assert!(bool_ops.iter().any(|sig| sig.name == "AND"));
        assert!(bool_ops.iter().any(|sig| sig.name == "IS NULL"));
    }

    #[test]
    fn test_like_family_returns_boolean() {
        for name in ["LIKE", "NOT LIKE", "GLOB", "NOT GLOB"] {
            let sig = CATALOG.iter().find(|s| s.name == name).unwrap();
            assert_eq!(sig.returns, &[DataType::Boolean], "{name}");
        }
        let concat = CATALOG.iter().find(|s| s.name == "||").unwrap();
        assert_eq!(concat.returns, &[DataType::String]);
    }

    #[test]
    fn test_signatures_with_return_type() {
        assert_eq!(signatures_with_return_type(None).count(), CATALOG.len());
        assert!(
            signatures_with_return_type(Some(DataType::String))
                .all(|sig| sig.returns.contains(&DataType::String))
        );
    }

    #[test]
    fn test_named_constants_are_registered() {
        for sig in [&NOT, &IS_NULL, &AND, &IS_NOT_DISTINCT_FROM, &COUNT, &MIN, &MAX, &SUM] {
            assert!(CATALOG.contains(sig), "{} missing", sig.name);
        }
        assert!(!CATALOG.contains(&RANDOM));
    }

    #[test]
    fn test_categories_populated() {
        for category in OpCategory::iter() {
            assert!(
                CATALOG.iter().any(|sig| sig.category == category),
                "no {category} signatures"
            );
        }
        assert_eq!(aggregates().count(), 6);
        assert!(window_functions().any(|sig| sig.name == "ROW_NUMBER"));
    }

    #[test]
    fn test_only_sqlite_syntax() {
        for name in ["ILIKE", "~~", "^", "NVL", "LPAD", "REGEXP_LIKE", "STRPOS"] {
            assert!(find(name).is_none(), "{name}");
        }
        assert_eq!(find("~").map(|sig| sig.category), Some(OpCategory::UnaryPrefix));
        assert_eq!(COUNT.arity, Arity::Fixed(1));
        let iif = find("IIF").unwrap();
        assert_eq!(iif.arg_rule(0), Some(Fixed(BOOL)));
    }

    #[test]
    fn test_arg_rule_variadic() {
        let char_fn = find("CHAR").unwrap();
        assert_eq!(char_fn.arg_rule(4), Some(Fixed(INT)));
        assert_eq!(COUNT.arg_rule(1), None);
        assert_eq!(NOT.arg_rule(0), Some(Fixed(BOOL)));
        assert_eq!(NOT.arg_rule(1), None);
    }
}

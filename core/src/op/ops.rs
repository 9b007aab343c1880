use anyhow::Error;

use crate::error::VmError;
use crate::util::code_table;
use crate::val::Value;

pub(crate) fn err_op<T: std::fmt::Display>(l: &Value, op: T, r: &Value) -> Error {
    VmError::type_error(format!("Invalid operands: {} {op} {}", l.type_name(), r.type_name()))
}

pub(crate) fn err_unary<T: std::fmt::Display>(op: T, v: &Value) -> Error {
    VmError::type_error(format!("Invalid operand: {op}({})", v.type_name()))
}

code_table! {
    /// Two-operand operators (minor byte of `Binary`).
    pub enum BinaryOp {
        And = 0 => "and",
        Or = 1 => "or",
        Xor = 2 => "xor",
        Add = 3 => "add",
        Sub = 4 => "sub",
        Mult = 5 => "mul",
        Divide = 6 => "div",
        IntegerDivide = 7 => "idiv",
        Remainder = 8 => "mod",
        Pow = 9 => "pow",
        Concat = 10 => "concat",
        ConcatEmpty = 11 => "concatempty",
        CompareEq = 12 => "cmpeq",
        CompareEqNc = 13 => "cmpeq_nc",
        CompareNe = 14 => "cmpne",
        CompareNeNc = 15 => "cmpne_nc",
        CompareLe = 16 => "cmple",
        CompareLeNc = 17 => "cmple_nc",
        CompareLt = 18 => "cmplt",
        CompareLtNc = 19 => "cmplt_nc",
        CompareGe = 20 => "cmpge",
        CompareGeNc = 21 => "cmpge_nc",
        CompareGt = 22 => "cmpgt",
        CompareGtNc = 23 => "cmpgt_nc",
        Min = 24 => "min",
        MinNc = 25 => "min_nc",
        Max = 26 => "max",
        MaxNc = 27 => "max_nc",
        FirstStr = 28 => "firststr",
        FirstStrNc = 29 => "firststr_nc",
        RestStr = 30 => "reststr",
        RestStrNc = 31 => "reststr_nc",
        FindStr = 32 => "findstr",
        FindStrNc = 33 => "findstr_nc",
        BitAnd = 34 => "bitand",
        BitOr = 35 => "bitor",
        BitXor = 36 => "bitxor",
        Str = 37 => "str",
        ATan = 38 => "atan",
        LCut = 39 => "lcut",
        RCut = 40 => "rcut",
        EndCut = 41 => "endcut",
        StrMult = 42 => "strmult",
        KeyAddParent = 43 => "keyaddparent",
        KeyFind = 44 => "keyfind",
        ArrayDim = 45 => "arraydim",
    }
}

impl BinaryOp {
    /// Relational operators; the ones a fused comparison may carry.
    pub fn is_comparison(self) -> bool {
        use BinaryOp::*;
        matches!(
            self,
            CompareEq
                | CompareEqNc
                | CompareNe
                | CompareNeNc
                | CompareLe
                | CompareLeNc
                | CompareLt
                | CompareLtNc
                | CompareGe
                | CompareGeNc
                | CompareGt
                | CompareGtNc
        )
    }
}

code_table! {
    /// One-operand operators (minor byte of `Unary`).
    pub enum UnaryOp {
        Not = 0 => "not",
        Bool = 1 => "bool",
        Neg = 2 => "neg",
        Pos = 3 => "pos",
        Sin = 4 => "sin",
        Cos = 5 => "cos",
        Tan = 6 => "tan",
        ATan = 7 => "atan",
        Exp = 8 => "exp",
        Log = 9 => "log",
        Sqrt = 10 => "sqrt",
        Abs = 11 => "abs",
        Trunc = 12 => "trunc",
        Round = 13 => "round",
        Zap = 14 => "zap",
        Length = 15 => "len",
        Str = 16 => "str",
        Trim = 17 => "trim",
        LTrim = 18 => "ltrim",
        RTrim = 19 => "rtrim",
        IsEmpty = 20 => "isempty",
        IsNum = 21 => "isnum",
        IsString = 22 => "isstr",
        IsArray = 23 => "isarray",
        IsProcedure = 24 => "isproc",
        Asc = 25 => "asc",
        Chr = 26 => "chr",
        Val = 27 => "val",
        UCase = 28 => "ucase",
        LCase = 29 => "lcase",
        Inc = 30 => "inc",
        Dec = 31 => "dec",
        BitNot = 32 => "bitnot",
        KeyCreate = 33 => "keycreate",
        KeyLookup = 34 => "keylookup",
        Atom = 35 => "atom",
        AtomStr = 36 => "atomstr",
    }
}

code_table! {
    /// Three-operand operators (minor byte of `Ternary`).
    pub enum TernaryOp {
        KeyAdd = 0 => "keyadd",
    }
}

use crate::op::{BinaryOp, TernaryOp, UnaryOp};
use crate::util::code_table;

code_table! {
    /// Instruction class (first byte of an instruction).
    pub enum Major {
        Push = 0 => "push",
        Binary = 1 => "binary",
        Unary = 2 => "unary",
        Ternary = 3 => "ternary",
        Jump = 4 => "jump",
        Indirect = 5 => "indirect",
        Stack = 6 => "stack",
        Pop = 7 => "pop",
        Store = 8 => "store",
        Memref = 9 => "memref",
        Dim = 10 => "dim",
        Special = 11 => "special",
        FusedUnary = 12 => "fusedunary",
        FusedBinary = 13 => "fusedbinary",
        FusedComparison = 14 => "fusedcomparison",
        FusedComparison2 = 15 => "fusedcomparison2",
        InplaceUnary = 16 => "inplaceunary",
    }
}

code_table! {
    /// Variable scope addressed by Push/Pop/Store/Dim and the fused pushes.
    pub enum Scope {
        NamedVariable = 0 => "var",
        Local = 1 => "loc",
        Static = 2 => "static",
        Shared = 3 => "shared",
        NamedShared = 4 => "gvar",
        Literal = 5 => "lit",
        Integer = 6 => "int",
        Boolean = 7 => "bool",
    }
}

code_table! {
    /// Minor of `Indirect` and `Memref`.
    pub enum IndirectOp {
        Call = 0 => "call",
        Load = 1 => "load",
        Store = 2 => "store",
        Pop = 3 => "pop",
    }
}

code_table! {
    /// Minor of `Stack`.
    pub enum StackOp {
        Dup = 0 => "dup",
        Drop = 1 => "drop",
        Swap = 2 => "swap",
    }
}

code_table! {
    /// Minor of `Special`.
    pub enum SpecialOp {
        Uncatch = 0 => "uncatch",
        Return = 1 => "return",
        With = 2 => "with",
        EndWith = 3 => "endwith",
        FirstIndex = 4 => "firstindex",
        NextIndex = 5 => "nextindex",
        EndIndex = 6 => "endindex",
        EvalStatement = 7 => "evalstmt",
        EvalExpr = 8 => "evalexpr",
        DefSub = 9 => "defsub",
        DefShipProperty = 10 => "defshipprop",
        DefPlanetProperty = 11 => "defplanetprop",
        Load = 12 => "load",
        Print = 13 => "print",
        AddHook = 14 => "addhook",
        RunHook = 15 => "runhook",
        Throw = 16 => "throw",
        Terminate = 17 => "terminate",
        Suspend = 18 => "suspend",
        NewArray = 19 => "newarray",
        MakeList = 20 => "makelist",
        NewHash = 21 => "newhash",
        Instance = 22 => "instance",
        ResizeArray = 23 => "resizearray",
        Bind = 24 => "bind",
    }
}

/// Jump minor bits.
pub mod jump {
    pub const IF_TRUE: u8 = 1;
    pub const IF_FALSE: u8 = 2;
    pub const IF_EMPTY: u8 = 4;
    /// All three conditions: jump without looking at the stack.
    pub const ALWAYS: u8 = IF_TRUE | IF_FALSE | IF_EMPTY;
    pub const POP: u8 = 8;
    pub const CATCH: u8 = 16;
    /// Label reference; replaced by an address in `relocate`.
    pub const SYMBOLIC: u8 = 32;

    pub const CONDITION_MASK: u8 = ALWAYS;

    const FLAG_NAMES: &[(u8, &str)] = &[(POP, "pop"), (CATCH, "catch"), (SYMBOLIC, "sym")];

    /// `"true|pop"` style rendering of a jump minor.
    pub fn describe(minor: u8) -> String {
        let mut parts: Vec<&str> = Vec::new();
        match minor & CONDITION_MASK {
            ALWAYS => parts.push("always"),
            cond => {
                if cond & IF_TRUE != 0 {
                    parts.push("true");
                }
                if cond & IF_FALSE != 0 {
                    parts.push("false");
                }
                if cond & IF_EMPTY != 0 {
                    parts.push("empty");
                }
            }
        }
        for (bit, name) in FLAG_NAMES {
            if minor & bit != 0 {
                parts.push(name);
            }
        }
        if parts.is_empty() {
            return "never".to_string();
        }
        parts.join("|")
    }

    /// Inverse of [`describe`].
    pub fn parse(text: &str) -> Option<u8> {
        let mut minor = 0;
        for part in text.split('|').map(str::trim) {
            minor |= match part.to_ascii_lowercase().as_str() {
                "never" => 0,
                "always" => ALWAYS,
                "true" => IF_TRUE,
                "false" => IF_FALSE,
                "empty" => IF_EMPTY,
                "pop" => POP,
                "catch" => CATCH,
                "sym" => SYMBOLIC,
                _ => return None,
            };
        }
        Some(minor)
    }
}

/// Mnemonic of `minor` under `major`, if the pair is valid.
pub fn minor_name(major: Major, minor: u8) -> Option<String> {
    let name = match major {
        Major::Push
        | Major::Pop
        | Major::Store
        | Major::Dim
        | Major::FusedUnary
        | Major::FusedBinary
        | Major::FusedComparison2
        | Major::InplaceUnary => Scope::from_u8(minor)?.name(),
        Major::Binary | Major::FusedComparison => BinaryOp::from_u8(minor)?.name(),
        Major::Unary => UnaryOp::from_u8(minor)?.name(),
        Major::Ternary => TernaryOp::from_u8(minor)?.name(),
        Major::Jump => return Some(jump::describe(minor)),
        Major::Indirect | Major::Memref => IndirectOp::from_u8(minor)?.name(),
        Major::Stack => StackOp::from_u8(minor)?.name(),
        Major::Special => SpecialOp::from_u8(minor)?.name(),
    };
    Some(name.to_string())
}

/// Minor byte for a mnemonic under `major`.
pub fn parse_minor(major: Major, text: &str) -> Option<u8> {
    match major {
        Major::Push
        | Major::Pop
        | Major::Store
        | Major::Dim
        | Major::FusedUnary
        | Major::FusedBinary
        | Major::FusedComparison2
        | Major::InplaceUnary => Scope::from_name(text).map(Scope::code),
        Major::Binary | Major::FusedComparison => BinaryOp::from_name(text).map(BinaryOp::code),
        Major::Unary => UnaryOp::from_name(text).map(UnaryOp::code),
        Major::Ternary => TernaryOp::from_name(text).map(TernaryOp::code),
        Major::Jump => jump::parse(text),
        Major::Indirect | Major::Memref => IndirectOp::from_name(text).map(IndirectOp::code),
        Major::Stack => StackOp::from_name(text).map(StackOp::code),
        Major::Special => SpecialOp::from_name(text).map(SpecialOp::code),
    }
}

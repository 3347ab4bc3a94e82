use crate::front::format::{Format, Value};
use indexmap::IndexSet;
use lazy_static::lazy_static;

#[derive(Debug, Clone, PartialEq)]
pub enum SignalRole {
    Input,
    Output,
    Internal,
    /// A module parameter with its default value.
    Param(Value),
    /// Exists only inside equation systems and is eliminated during extraction.
    Auxiliary,
}

#[derive(Debug, Clone)]
pub struct SignalInfo {
    pub name: String,
    pub format: Format,
    pub role: SignalRole,
    /// Reset value if the signal becomes a register.
    pub init: Option<Value>,
}

/// Whether `name` can be used unescaped as an identifier in the emitted hardware description.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let first_ok = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    first_ok && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') && !KEYWORDS.contains(name)
}

lazy_static! {
    /// Reserved words of SystemVerilog (IEEE 1800-2017) that could plausibly collide with signal names.
    static ref KEYWORDS: IndexSet<&'static str> = [
        "always", "always_comb", "always_ff", "always_latch", "and", "assign", "automatic", "begin", "bit",
        "buf", "byte", "case", "casex", "casez", "chandle", "class", "const", "default", "defparam", "do",
        "edge", "else", "end", "endcase", "endfunction", "endgenerate", "endmodule", "endtask", "enum",
        "event", "final", "for", "force", "forever", "fork", "function", "generate", "genvar", "if",
        "initial", "inout", "input", "int", "integer", "interface", "join", "localparam", "logic", "longint",
        "module", "nand", "negedge", "nor", "not", "or", "output", "packed", "parameter", "posedge",
        "real", "realtime", "reg", "repeat", "return", "shortint", "shortreal", "signed", "string",
        "struct", "supply0", "supply1", "task", "time", "tri", "type", "typedef", "union", "unsigned",
        "var", "void", "wait", "while", "wire", "wor", "xnor", "xor",
    ]
    .into_iter()
    .collect();
}

use std::fmt::{Display, Formatter};

/// Indentation depth, displayed as that many copies of [Indent::I].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Indent {
    depth: usize,
}

impl Indent {
    pub const I: &'static str = "    ";

    pub fn new(depth: usize) -> Indent {
        Indent { depth }
    }

    pub fn nest(self) -> Indent {
        Indent { depth: self.depth + 1 }
    }
}

impl Display for Indent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for _ in 0..self.depth {
            f.write_str(Self::I)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::indent::Indent;

    #[test]
    fn nested() {
        let indent = Indent::new(0).nest().nest();
        assert_eq!(indent.to_string(), "        ");
    }
}

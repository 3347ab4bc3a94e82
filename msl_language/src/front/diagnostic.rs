use annotate_snippets::renderer::{AnsiColor, Color, Style};
use annotate_snippets::{Level, Renderer};
use std::cell::RefCell;

/// Sink for advisory messages that do not stop compilation.
/// Hard errors are returned as `Err` instead, see [crate::error::CompileError].
pub struct Diagnostics {
    diagnostics: RefCell<Vec<Diagnostic>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self {
            diagnostics: RefCell::new(vec![]),
        }
    }

    pub fn report(&self, diag: Diagnostic) {
        self.diagnostics.borrow_mut().push(diag);
    }

    pub fn len(&self) -> usize {
        self.diagnostics.borrow().len()
    }

    pub fn titles(&self) -> Vec<String> {
        self.diagnostics.borrow().iter().map(|d| d.title.clone()).collect()
    }

    pub fn finish(self) -> Vec<Diagnostic> {
        self.diagnostics.into_inner()
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub level: Level,
    pub title: String,
    pub footers: Vec<(Level, String)>,
}

impl Diagnostic {
    pub fn warning(title: impl Into<String>) -> Diagnostic {
        Diagnostic {
            level: Level::Warning,
            title: title.into(),
            footers: vec![],
        }
    }

    pub fn footer(mut self, level: Level, footer: impl Into<String>) -> Self {
        self.footers.push((level, footer.into()));
        self
    }

    pub fn to_string(&self, styled: bool) -> String {
        let mut message = self.level.title(&self.title);
        for (level, footer) in &self.footers {
            message = message.footer(level.title(footer));
        }

        let renderer = if styled {
            Renderer::styled().emphasis(Style::new().bold().fg_color(Some(Color::Ansi(AnsiColor::BrightYellow))))
        } else {
            Renderer::plain()
        };
        let rendered = renderer.render(message).to_string();
        rendered
    }
}

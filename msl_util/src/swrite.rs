use std::fmt::Arguments;

/// Anything that can be appended to like a `String`.
pub trait StringSink {
    fn sink(&mut self) -> &mut String;
}

impl StringSink for String {
    fn sink(&mut self) -> &mut String {
        self
    }
}

impl<T: StringSink + ?Sized> StringSink for &mut T {
    fn sink(&mut self) -> &mut String {
        (**self).sink()
    }
}

/// Formatting into a `String` cannot fail, so unlike `write!` this does not return a `Result`.
pub fn append_fmt(dst: &mut String, args: Arguments) {
    match args.as_str() {
        Some(s) => dst.push_str(s),
        None => {
            use std::fmt::Write;
            // infallible for String
            let _ = dst.write_fmt(args);
        }
    }
}

/// `write!` for strings, without the spurious `fmt::Result`.
#[macro_export]
macro_rules! swrite {
    ($dst:expr, $($arg:tt)*) => {{
        use $crate::swrite::StringSink;
        $crate::swrite::append_fmt($dst.sink(), format_args!($($arg)*))
    }};
}

/// `writeln!` for strings, without the spurious `fmt::Result`.
#[macro_export]
macro_rules! swriteln {
    ($dst:expr $(,)?) => {{
        use $crate::swrite::StringSink;
        $dst.sink().push('\n')
    }};
    ($dst:expr, $($arg:tt)*) => {{
        use $crate::swrite::StringSink;
        let dst = $dst.sink();
        $crate::swrite::append_fmt(dst, format_args!($($arg)*));
        dst.push('\n');
    }};
}

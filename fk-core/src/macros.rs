// Builds the Option<BTreeMap<String, String>> shape that object metadata
// wants from a list of key/value pairs
#[macro_export]
macro_rules! klabel {
    ($($k:expr => $v:expr),+ $(,)?) => {
        Some([$(($k.to_string(), $v.to_string())),+].into())
    };
}

pub use klabel;

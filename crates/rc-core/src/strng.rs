//! Cheap-to-clone interned-ish string type used pervasively across the gateway:
//! route names, provider ids, runtime keys, header values. Backed by `arcstr`
//! so clones are a refcount bump rather than an allocation.

pub type Strng = arcstr::ArcStr;

/// Build a `Strng` from a `'static` string literal at zero cost.
#[macro_export]
macro_rules! literal {
	($s:expr) => {
		arcstr::literal!($s)
	};
}

pub fn new(s: &str) -> Strng {
	arcstr::ArcStr::from(s)
}

pub use literal;

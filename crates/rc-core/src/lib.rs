pub mod bow;
pub mod strng;

pub mod prelude {
	pub use crate::strng::Strng;
}

pub mod script;
pub mod shapes;
pub mod text;

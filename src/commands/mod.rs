pub mod compare;
pub mod run;

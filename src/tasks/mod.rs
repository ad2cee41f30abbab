pub mod audio;
pub mod dispatcher;
pub mod motion;
pub mod periodic;

// Module audio - Transport clock and cpal output binding

pub mod stream;
pub mod timing;

pub mod fft;
pub mod stft;

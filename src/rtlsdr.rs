//! RTL2832U receiver backend.
//!
//! `librtlsdr` is loaded at runtime with `libloading`, so the binary builds
//! and runs (with `--simulate`) on hosts without the library installed.
//!
//! Samples arrive as interleaved unsigned 8-bit I/Q, `[I0, Q0, I1, Q1, ...]`,
//! with 127.5 as zero.

use std::ffi::{c_int, c_uint, c_void};
use std::ptr;

use libloading::Library;
use num_complex::Complex32;

use crate::device::{DeviceError, Receiver, TunerGain};

type DevHandle = *mut c_void;

/// `read_sync` transfers must be a multiple of this many bytes
const READ_BLOCK: usize = 512;

#[cfg(target_os = "linux")]
const LIB_NAMES: &[&str] = &["librtlsdr.so.0", "librtlsdr.so"];

#[cfg(target_os = "macos")]
const LIB_NAMES: &[&str] = &["librtlsdr.dylib", "librtlsdr.0.dylib"];

#[cfg(target_os = "windows")]
const LIB_NAMES: &[&str] = &["rtlsdr.dll", "librtlsdr.dll"];

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
const LIB_NAMES: &[&str] = &["librtlsdr.so"];

/// Function table resolved from the loaded library. The pointers are only
/// valid while `_lib` is alive.
struct RtlSdrLib {
    get_device_count: unsafe extern "C" fn() -> c_uint,
    open: unsafe extern "C" fn(*mut DevHandle, c_uint) -> c_int,
    close: unsafe extern "C" fn(DevHandle) -> c_int,
    set_center_freq: unsafe extern "C" fn(DevHandle, c_uint) -> c_int,
    set_sample_rate: unsafe extern "C" fn(DevHandle, c_uint) -> c_int,
    set_tuner_gain_mode: unsafe extern "C" fn(DevHandle, c_int) -> c_int,
    set_tuner_gain: unsafe extern "C" fn(DevHandle, c_int) -> c_int,
    get_tuner_gains: unsafe extern "C" fn(DevHandle, *mut c_int) -> c_int,
    set_freq_correction: unsafe extern "C" fn(DevHandle, c_int) -> c_int,
    reset_buffer: unsafe extern "C" fn(DevHandle) -> c_int,
    read_sync: unsafe extern "C" fn(DevHandle, *mut c_void, c_int, *mut c_int) -> c_int,
    _lib: Library,
}

impl RtlSdrLib {
    fn load() -> Result<Self, DeviceError> {
        for name in LIB_NAMES {
            // SAFETY: loading librtlsdr runs no initializers with preconditions.
            let Ok(lib) = (unsafe { Library::new(name) }) else {
                continue;
            };
            // SAFETY: signatures match rtl-sdr.h.
            match unsafe { Self::resolve(lib) } {
                Ok(table) => {
                    log::debug!("loaded {}", name);
                    return Ok(table);
                }
                Err(e) => log::warn!("{} is missing symbols: {}", name, e),
            }
        }
        Err(DeviceError::LibraryNotFound)
    }

    unsafe fn resolve(lib: Library) -> Result<Self, libloading::Error> {
        Ok(Self {
            get_device_count: sym(&lib, b"rtlsdr_get_device_count\0")?,
            open: sym(&lib, b"rtlsdr_open\0")?,
            close: sym(&lib, b"rtlsdr_close\0")?,
            set_center_freq: sym(&lib, b"rtlsdr_set_center_freq\0")?,
            set_sample_rate: sym(&lib, b"rtlsdr_set_sample_rate\0")?,
            set_tuner_gain_mode: sym(&lib, b"rtlsdr_set_tuner_gain_mode\0")?,
            set_tuner_gain: sym(&lib, b"rtlsdr_set_tuner_gain\0")?,
            get_tuner_gains: sym(&lib, b"rtlsdr_get_tuner_gains\0")?,
            set_freq_correction: sym(&lib, b"rtlsdr_set_freq_correction\0")?,
            reset_buffer: sym(&lib, b"rtlsdr_reset_buffer\0")?,
            read_sync: sym(&lib, b"rtlsdr_read_sync\0")?,
            _lib: lib,
        })
    }
}

unsafe fn sym<T: Copy>(lib: &Library, name: &[u8]) -> Result<T, libloading::Error> {
    lib.get::<T>(name).map(|symbol| *symbol)
}

fn check(operation: &'static str, code: c_int) -> Result<(), DeviceError> {
    if code == 0 {
        Ok(())
    } else {
        Err(DeviceError::OperationFailed { operation, code })
    }
}

/// An open RTL-SDR dongle. Closed on drop.
pub struct RtlSdrReceiver {
    lib: RtlSdrLib,
    handle: DevHandle,
    index: u32,
    /// Supported gains in tenths of dB
    gains: Vec<i32>,
    ppm: i32,
    sample_rate: u32,
    center_freq: u32,
}

// SAFETY: the handle is only used through `&mut self`, never shared.
unsafe impl Send for RtlSdrReceiver {}

impl RtlSdrReceiver {
    /// Open the dongle at `index`.
    pub fn open(index: u32) -> Result<Self, DeviceError> {
        let lib = RtlSdrLib::load()?;

        let count = unsafe { (lib.get_device_count)() };
        if index >= count {
            return Err(DeviceError::NotFound(index));
        }

        let mut handle: DevHandle = ptr::null_mut();
        let ret = unsafe { (lib.open)(&mut handle, index) };
        if ret != 0 || handle.is_null() {
            return Err(DeviceError::OpenFailed(ret));
        }

        let mut gains = [0 as c_int; 64];
        let n = unsafe { (lib.get_tuner_gains)(handle, gains.as_mut_ptr()) };
        let gains = gains[..n.clamp(0, 64) as usize].to_vec();

        log::info!("opened RTL-SDR #{} with {} gain steps", index, gains.len());
        Ok(Self {
            lib,
            handle,
            index,
            gains,
            ppm: 0,
            sample_rate: 0,
            center_freq: 0,
        })
    }
}

impl Receiver for RtlSdrReceiver {
    fn set_frequency_correction(&mut self, ppm: i32) -> Result<(), DeviceError> {
        // librtlsdr rejects a correction equal to the current one
        if ppm == self.ppm {
            return Ok(());
        }
        check("set_freq_correction", unsafe {
            (self.lib.set_freq_correction)(self.handle, ppm)
        })?;
        self.ppm = ppm;
        Ok(())
    }

    fn set_tuner_gain(&mut self, gain: TunerGain) -> Result<(), DeviceError> {
        match gain {
            TunerGain::Auto => check("set_tuner_gain_mode", unsafe {
                (self.lib.set_tuner_gain_mode)(self.handle, 0)
            }),
            TunerGain::Manual(db) => {
                check("set_tuner_gain_mode", unsafe {
                    (self.lib.set_tuner_gain_mode)(self.handle, 1)
                })?;
                let tenths = nearest_gain(&self.gains, (db * 10.0).round() as i32);
                log::debug!("tuner gain {:.1} dB", tenths as f64 / 10.0);
                check("set_tuner_gain", unsafe {
                    (self.lib.set_tuner_gain)(self.handle, tenths)
                })
            }
        }
    }

    fn set_sample_rate(&mut self, rate_hz: u32) -> Result<(), DeviceError> {
        check("set_sample_rate", unsafe {
            (self.lib.set_sample_rate)(self.handle, rate_hz)
        })?;
        self.sample_rate = rate_hz;
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn set_center_frequency(&mut self, freq_hz: u32) -> Result<(), DeviceError> {
        check("set_center_freq", unsafe {
            (self.lib.set_center_freq)(self.handle, freq_hz)
        })?;
        self.center_freq = freq_hz;
        Ok(())
    }

    fn center_frequency(&self) -> u32 {
        self.center_freq
    }

    fn read_samples(&mut self, count: usize) -> Result<Vec<Complex32>, DeviceError> {
        let wanted = count * 2;
        let len = read_len(wanted);
        let mut raw = vec![0u8; len];
        let len_c = c_int::try_from(len).map_err(|_| DeviceError::OperationFailed {
            operation: "read_sync",
            code: -1,
        })?;

        check("reset_buffer", unsafe { (self.lib.reset_buffer)(self.handle) })?;
        let mut n_read: c_int = 0;
        check("read_sync", unsafe {
            (self.lib.read_sync)(self.handle, raw.as_mut_ptr().cast(), len_c, &mut n_read)
        })?;

        let got = usize::try_from(n_read).unwrap_or(0);
        if got < wanted {
            return Err(DeviceError::ShortRead {
                expected: wanted,
                got,
            });
        }
        Ok(convert_samples(&raw[..wanted]))
    }
}

impl Drop for RtlSdrReceiver {
    fn drop(&mut self) {
        log::debug!("closing RTL-SDR #{}", self.index);
        unsafe { (self.lib.close)(self.handle) };
    }
}

/// Closest supported gain, or the request itself if the tuner reported none.
fn nearest_gain(gains: &[i32], tenths: i32) -> i32 {
    gains
        .iter()
        .copied()
        .min_by_key(|g| (g - tenths).abs())
        .unwrap_or(tenths)
}

/// Byte count to request for `bytes` of payload.
fn read_len(bytes: usize) -> usize {
    bytes.div_ceil(READ_BLOCK).max(1) * READ_BLOCK
}

fn u8_to_f32(sample: u8) -> f32 {
    (sample as f32 - 127.5) / 127.5
}

/// Interleaved unsigned 8-bit I/Q to complex samples in [-1, 1].
pub fn convert_samples(raw: &[u8]) -> Vec<Complex32> {
    raw.chunks_exact(2)
        .map(|iq| Complex32::new(u8_to_f32(iq[0]), u8_to_f32(iq[1])))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_conversion_range() {
        assert!((u8_to_f32(0) + 1.0).abs() < 1e-6);
        assert!((u8_to_f32(255) - 1.0).abs() < 1e-6);
        assert!(u8_to_f32(128).abs() < 0.01);
    }

    #[test]
    fn convert_interleaved_pairs() {
        let raw = [128u8, 128, 0, 255, 255, 0, 7];
        let samples = convert_samples(&raw);
        // Trailing odd byte is dropped
        assert_eq!(samples.len(), 3);
        assert!((samples[1].re + 1.0).abs() < 1e-6);
        assert!((samples[1].im - 1.0).abs() < 1e-6);
        assert!((samples[2].re - 1.0).abs() < 1e-6);
    }

    #[test]
    fn read_len_rounds_up_to_block() {
        assert_eq!(read_len(0), 512);
        assert_eq!(read_len(1), 512);
        assert_eq!(read_len(512), 512);
        assert_eq!(read_len(513), 1024);
        assert_eq!(read_len(2 * 1024), 2048);
    }

    #[test]
    fn nearest_gain_picks_closest_step() {
        let gains = [0, 9, 14, 27, 37, 77, 87, 125, 144, 157, 166, 197, 207, 229, 254];
        assert_eq!(nearest_gain(&gains, 200), 197);
        assert_eq!(nearest_gain(&gains, 1000), 254);
        assert_eq!(nearest_gain(&gains, -5), 0);
        assert_eq!(nearest_gain(&[], 150), 150);
    }

    #[test]
    fn open_without_hardware_fails_cleanly() {
        // No host has a dongle at this index, with or without librtlsdr
        let err = RtlSdrReceiver::open(u32::MAX).err().unwrap();
        assert!(matches!(
            err,
            DeviceError::LibraryNotFound | DeviceError::NotFound(_)
        ));
    }
}

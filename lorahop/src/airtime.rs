//! LoRa time-on-air.
//!
//! Semtech AN1200.13 formula, evaluated in integer microseconds so it works
//! without floating-point `ceil` in `no_std`:
//!
//! ```text
//! T_sym      = 2^SF / BW
//! T_preamble = (n_preamble + 4.25) * T_sym
//! n_payload  = 8 + max(ceil((8PL - 4SF + 28 + 16CRC - 20IH) / (4(SF - 2DE))) * (CR + 4), 0)
//! T_packet   = T_preamble + n_payload * T_sym
//! ```

use crate::time::Duration;

/// Radio modulation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoraParams {
    /// Spreading factor, 7..=12.
    pub spreading_factor: u8,
    pub bandwidth_hz: u32,
    /// Coding rate denominator offset: 1 = 4/5 ... 4 = 4/8.
    pub coding_rate: u8,
    pub preamble_len: u16,
    pub explicit_header: bool,
    pub crc: bool,
    pub low_data_rate_optimize: bool,
}

impl LoraParams {
    /// 125 kHz, CR 4/5, 8-symbol preamble, explicit header, CRC on.
    ///
    /// Low data rate optimisation is enabled when a symbol lasts 16 ms or
    /// more (SF11 and SF12 at 125 kHz).
    pub fn new(spreading_factor: u8) -> Self {
        let bandwidth_hz = 125_000;
        Self {
            spreading_factor,
            bandwidth_hz,
            coding_rate: 1,
            preamble_len: 8,
            explicit_header: true,
            crc: true,
            low_data_rate_optimize: symbol_time_us(spreading_factor, bandwidth_hz) >= 16_000,
        }
    }

    pub fn sf7() -> Self {
        Self::new(7)
    }

    pub fn sf12() -> Self {
        Self::new(12)
    }

    /// Duration of one symbol.
    pub fn symbol_time(&self) -> Duration {
        Duration::from_millis(symbol_time_us(self.spreading_factor, self.bandwidth_hz) / 1000)
    }

    /// Symbols spent on the payload and header (excluding preamble).
    pub fn payload_symbols(&self, payload_len: usize) -> u64 {
        let sf = self.spreading_factor as i64;
        let de = self.low_data_rate_optimize as i64;
        let ih = (!self.explicit_header) as i64;
        let crc = self.crc as i64;

        let num = 8 * payload_len as i64 - 4 * sf + 28 + 16 * crc - 20 * ih;
        let den = 4 * (sf - 2 * de);
        let blocks = if num > 0 && den > 0 {
            (num + den - 1) / den
        } else {
            0
        };
        8 + (blocks * (self.coding_rate as i64 + 4)) as u64
    }
}

impl Default for LoraParams {
    fn default() -> Self {
        Self::sf7()
    }
}

fn symbol_time_us(spreading_factor: u8, bandwidth_hz: u32) -> u64 {
    if bandwidth_hz == 0 {
        return 0;
    }
    (1u64 << spreading_factor.min(12)) * 1_000_000 / bandwidth_hz as u64
}

/// Airtime of a frame carrying `payload_len` PHY payload bytes, rounded to
/// the nearest millisecond.
pub fn time_on_air(params: &LoraParams, payload_len: usize) -> Duration {
    if params.bandwidth_hz == 0 {
        return Duration::ZERO;
    }
    // Quarter-symbols keep the 4.25 preamble tail exact.
    let quarter_symbols =
        4 * params.preamble_len as u64 + 17 + 4 * params.payload_symbols(payload_len);
    let sf = params.spreading_factor.min(12) as u32;
    let us = quarter_symbols * (1u64 << sf) * 1_000_000 / (4 * params.bandwidth_hz as u64);
    Duration::from_millis((us + 500) / 1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ldro_selection() {
        assert!(!LoraParams::sf7().low_data_rate_optimize);
        assert!(!LoraParams::new(10).low_data_rate_optimize);
        assert!(LoraParams::new(11).low_data_rate_optimize);
        assert!(LoraParams::sf12().low_data_rate_optimize);
    }

    #[test]
    fn test_symbol_time() {
        assert_eq!(LoraParams::sf7().symbol_time(), Duration::from_millis(1));
        assert_eq!(LoraParams::sf12().symbol_time(), Duration::from_millis(32));
    }

    #[test]
    fn test_sf12_short_frame() {
        // 12.25 preamble + 23 payload symbols of 32.768 ms
        assert_eq!(LoraParams::sf12().payload_symbols(11), 23);
        assert_eq!(time_on_air(&LoraParams::sf12(), 11), Duration::from_millis(1155));
    }

    #[test]
    fn test_sf7_frames() {
        // 12.25 + 28 symbols of 1.024 ms = 41.216 ms
        assert_eq!(time_on_air(&LoraParams::sf7(), 11), Duration::from_millis(41));
        // 12.25 + 48 symbols = 61.696 ms
        assert_eq!(LoraParams::sf7().payload_symbols(24), 48);
        assert_eq!(time_on_air(&LoraParams::sf7(), 24), Duration::from_millis(62));
    }

    #[test]
    fn test_monotonic_in_length() {
        let p = LoraParams::sf7();
        let mut last = Duration::ZERO;
        for len in 0..=255 {
            let t = time_on_air(&p, len);
            assert!(t >= last);
            last = t;
        }
    }

    #[test]
    fn test_empty_payload_floor() {
        // Negative numerator clamps to the 8 mandatory symbols.
        let mut p = LoraParams::sf12();
        p.crc = false;
        p.explicit_header = false;
        assert_eq!(p.payload_symbols(0), 8);
    }
}

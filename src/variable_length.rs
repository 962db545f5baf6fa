/* Copyright 2015 Google Inc. All Rights Reserved.

   Distributed under MIT license.
   See file LICENSE for detail or copy at https://opensource.org/licenses/MIT
*/

//! Readers for the WOFF2 variable length types: 255UInt16 and UIntBase128

use bytes::Buf;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VariableLengthError {
    /// Ran out of input part way through a value
    Truncated,
    /// UIntBase128 values may not start with a 0x80 byte
    LeadingZero,
    /// The value does not fit in 32 bits
    Overflow,
    /// The fifth byte of a UIntBase128 still has its continuation bit set
    Unterminated,
}

impl VariableLengthError {
    pub fn reason(self) -> &'static str {
        match self {
            Self::Truncated => "truncated variable length integer",
            Self::LeadingZero => "UIntBase128 with leading zeros",
            Self::Overflow => "UIntBase128 overflows 32 bits",
            Self::Unterminated => "UIntBase128 longer than 5 bytes",
        }
    }
}

impl From<bytes::TryGetError> for VariableLengthError {
    fn from(_value: bytes::TryGetError) -> Self {
        Self::Truncated
    }
}

pub trait BufVariableExt: Buf {
    /// Read a 255UInt16
    ///
    /// Based on section 6.1.1 of MicroType Express draft spec
    fn try_get_variable_255_u16(&mut self) -> Result<u16, VariableLengthError> {
        const WORD_CODE: u8 = 253;
        const ONE_MORE_BYTE_CODE_2: u8 = 254;
        const ONE_MORE_BYTE_CODE_1: u8 = 255;
        const LOWEST_U_CODE: u16 = 253;

        let code = self.try_get_u8()?;
        Ok(match code {
            WORD_CODE => self.try_get_u16()?,
            ONE_MORE_BYTE_CODE_1 => self.try_get_u8()? as u16 + LOWEST_U_CODE,
            ONE_MORE_BYTE_CODE_2 => self.try_get_u8()? as u16 + LOWEST_U_CODE * 2,
            _ => code as u16,
        })
    }

    /// Read a UIntBase128: big-endian groups of 7 bits, high bit set on every byte but the last
    fn try_get_variable_128_u32(&mut self) -> Result<u32, VariableLengthError> {
        let mut result: u32 = 0;
        for i in 0..5 {
            let code = self.try_get_u8()?;
            if i == 0 && code == 0x80 {
                return Err(VariableLengthError::LeadingZero);
            }
            // If any of the top seven bits are set then we're about to overflow.
            if (result & 0xfe000000) != 0 {
                return Err(VariableLengthError::Overflow);
            }
            result = (result << 7) | ((code & 0x7f) as u32);
            if (code & 0x80) == 0 {
                return Ok(result);
            }
        }
        Err(VariableLengthError::Unterminated)
    }
}

impl<T: Buf> BufVariableExt for T {}

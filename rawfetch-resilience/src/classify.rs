//! Status-code policy and outcome classification

use rawfetch_http::HttpResponse;
use std::collections::BTreeSet;

use crate::errors::{AttemptFailure, StrategyError};

/// What the engine does with the outcome of an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Success,
    Retry,
    Fatal,
}

/// Which 4xx/5xx statuses count as success and which end the request
///
/// Codes are compared as their 3-digit decimal string. Fatal entries may
/// wildcard the last digit (`50x`) or the last two (`5xx`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusPolicy {
    normal_codes: BTreeSet<String>,
    fatal_codes: BTreeSet<String>,
}

impl StatusPolicy {
    pub fn new<N, F>(normal_codes: N, fatal_codes: F) -> Result<Self, StrategyError>
    where
        N: IntoIterator,
        N::Item: Into<String>,
        F: IntoIterator,
        F::Item: Into<String>,
    {
        let normal_codes = normal_codes
            .into_iter()
            .map(|code| {
                let code = code.into();
                validate_normal_code(&code).map(|_| code)
            })
            .collect::<Result<BTreeSet<_>, _>>()?;
        let fatal_codes = fatal_codes
            .into_iter()
            .map(|code| {
                let code = code.into();
                validate_fatal_code(&code).map(|_| code)
            })
            .collect::<Result<BTreeSet<_>, _>>()?;

        Ok(Self {
            normal_codes,
            fatal_codes,
        })
    }

    pub fn normal_codes(&self) -> impl Iterator<Item = &str> {
        self.normal_codes.iter().map(String::as_str)
    }

    pub fn fatal_codes(&self) -> impl Iterator<Item = &str> {
        self.fatal_codes.iter().map(String::as_str)
    }

    pub fn classify_status(&self, status: u16) -> Verdict {
        if !(400..600).contains(&status) {
            return Verdict::Success;
        }

        let code = format!("{:03}", status);
        if self.normal_codes.contains(&code) {
            Verdict::Success
        } else if self.is_fatal(&code) {
            Verdict::Fatal
        } else {
            Verdict::Retry
        }
    }

    /// Transport failures and timeouts are always worth another try
    pub fn classify(&self, outcome: &Result<HttpResponse, AttemptFailure>) -> Verdict {
        match outcome {
            Ok(response) => self.classify_status(response.status),
            Err(_) => Verdict::Retry,
        }
    }

    fn is_fatal(&self, code: &str) -> bool {
        self.fatal_codes.contains(code)
            || self.fatal_codes.contains(&format!("{}x", &code[..2]))
            || self.fatal_codes.contains(&format!("{}xx", &code[..1]))
    }
}

fn starts_with_4_or_5(code: &str) -> bool {
    matches!(code.as_bytes().first(), Some(b'4' | b'5'))
}

/// A normal code is an exact status between 400 and 599
pub fn validate_normal_code(code: &str) -> Result<(), StrategyError> {
    let valid = code.len() == 3
        && code.bytes().all(|b| b.is_ascii_digit())
        && starts_with_4_or_5(code);
    if valid {
        Ok(())
    } else {
        Err(StrategyError::InvalidNormalCode(code.to_string()))
    }
}

/// A fatal code is `DDD`, `DDx` or `Dxx`, starting with 4 or 5
pub fn validate_fatal_code(code: &str) -> Result<(), StrategyError> {
    let bytes = code.as_bytes();
    let valid = bytes.len() == 3
        && starts_with_4_or_5(code)
        && match bytes {
            [_, b'x', b'x'] => true,
            [_, tens, b'x'] => tens.is_ascii_digit(),
            [_, tens, units] => tens.is_ascii_digit() && units.is_ascii_digit(),
            _ => false,
        };
    if valid {
        Ok(())
    } else {
        Err(StrategyError::InvalidFatalCode(code.to_string()))
    }
}

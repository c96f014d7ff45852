//! Structural checks behind the shape detector: check digits, octet ranges
//! and calendar validity. Independent of the regexes that found the value.

use chrono::NaiveDate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeCheck {
    /// Brazilian CPF, two mod-11 check digits.
    Cpf,
    /// Brazilian CNPJ, two weighted mod-11 check digits.
    Cnpj,
    /// Card number, Luhn checksum.
    Luhn,
    Ipv4,
    /// US SSN area/group/serial rules.
    SsnUs,
    /// `dd/mm/yyyy` that names a real day.
    DateBr,
}

impl ShapeCheck {
    pub fn validate(&self, text: &str) -> bool {
        match self {
            ShapeCheck::Cpf => cpf(&digits(text)),
            ShapeCheck::Cnpj => cnpj(&digits(text)),
            ShapeCheck::Luhn => luhn(&digits(text)),
            ShapeCheck::Ipv4 => ipv4(text),
            ShapeCheck::SsnUs => ssn_us(text),
            ShapeCheck::DateBr => NaiveDate::parse_from_str(text.trim(), "%d/%m/%Y").is_ok(),
        }
    }
}

fn digits(text: &str) -> Vec<u32> {
    text.chars().filter_map(|c| c.to_digit(10)).collect()
}

fn all_same(d: &[u32]) -> bool {
    d.windows(2).all(|w| w[0] == w[1])
}

fn cpf(d: &[u32]) -> bool {
    if d.len() != 11 || all_same(d) {
        return false;
    }
    let check = |len: usize| {
        let sum: u32 = d[..len]
            .iter()
            .enumerate()
            .map(|(i, v)| v * (len as u32 + 1 - i as u32))
            .sum();
        match (sum * 10) % 11 {
            10 => 0,
            r => r,
        }
    };
    check(9) == d[9] && check(10) == d[10]
}

fn cnpj(d: &[u32]) -> bool {
    const FIRST: [u32; 12] = [5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
    const SECOND: [u32; 13] = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];

    if d.len() != 14 || all_same(d) {
        return false;
    }
    let check = |weights: &[u32]| {
        let sum: u32 = weights.iter().zip(d).map(|(w, v)| w * v).sum();
        match sum % 11 {
            r if r < 2 => 0,
            r => 11 - r,
        }
    };
    check(&FIRST) == d[12] && check(&SECOND) == d[13]
}

fn luhn(d: &[u32]) -> bool {
    if !(13..=19).contains(&d.len()) {
        return false;
    }
    let sum: u32 = d
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &v)| {
            if i % 2 == 1 {
                let doubled = v * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                v
            }
        })
        .sum();
    sum % 10 == 0
}

fn ipv4(text: &str) -> bool {
    let octets: Vec<&str> = text.trim().split('.').collect();
    octets.len() == 4
        && octets.iter().all(|o| {
            !o.is_empty()
                && o.len() <= 3
                && o.bytes().all(|b| b.is_ascii_digit())
                && o.parse::<u8>().is_ok()
        })
}

fn ssn_us(text: &str) -> bool {
    let parts: Vec<&str> = text.trim().split('-').collect();
    let [area, group, serial] = parts.as_slice() else {
        return false;
    };
    let (Ok(a), Ok(g), Ok(s)) = (
        area.parse::<u16>(),
        group.parse::<u8>(),
        serial.parse::<u16>(),
    ) else {
        return false;
    };
    a != 0 && a != 666 && a < 900 && g != 0 && s != 0
}

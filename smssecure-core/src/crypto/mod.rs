// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod encryption;
pub mod kdf;

pub use encryption::{decrypt, encrypt, EncryptionError, SymmetricKey};
pub use kdf::HKDF;

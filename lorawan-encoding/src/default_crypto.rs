//! Provides a default software implementation for LoRaWAN's cryptographic functions,
//! built on the `aes` and `cmac` crates.
use super::keys::*;
use super::securityhelpers::generic_array::{typenum, GenericArray};
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;

pub type Cmac = cmac::Cmac<Aes128>;

/// Provides a default implementation for build object for using the crypto functions.
#[derive(Default, Debug, PartialEq, Eq)]
pub struct DefaultFactory;

impl CryptoFactory for DefaultFactory {
    type E = Aes128;
    type D = Aes128;
    type M = Cmac;

    fn new_enc(&self, key: &AES128) -> Self::E {
        Aes128::new(GenericArray::from_slice(&key.0[..]))
    }

    fn new_dec(&self, key: &AES128) -> Self::D {
        Aes128::new(GenericArray::from_slice(&key.0[..]))
    }

    fn new_mac(&self, key: &AES128) -> Self::M {
        let key = GenericArray::from_slice(&key.0[..]);
        cmac::Mac::new(key)
    }
}

impl Encrypter for Aes128 {
    fn encrypt_block(&self, block: &mut GenericArray<u8, typenum::U16>) {
        BlockEncrypt::encrypt_block(self, block);
    }
}

impl Decrypter for Aes128 {
    fn decrypt_block(&self, block: &mut GenericArray<u8, typenum::U16>) {
        BlockDecrypt::decrypt_block(self, block);
    }
}

impl Mac for Cmac {
    fn input(&mut self, data: &[u8]) {
        cmac::Mac::update(self, data);
    }

    fn reset(&mut self) {
        cmac::Mac::reset(self);
    }

    fn result(self) -> GenericArray<u8, typenum::U16> {
        cmac::Mac::finalize(self).into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let factory = DefaultFactory;
        let key = AES128([0x2b; 16]);
        let enc = factory.new_enc(&key);
        let dec = factory.new_dec(&key);
        let mut block = GenericArray::clone_from_slice(&[0u8; 16]);
        let plain = block;
        Encrypter::encrypt_block(&enc, &mut block);
        assert_ne!(block, plain);
        Decrypter::decrypt_block(&dec, &mut block);
        assert_eq!(block, plain);
    }
}

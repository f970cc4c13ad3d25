//! Fixed-length byte-string identifiers used throughout LoRaWAN payloads
//! (device/network addresses and nonces).

macro_rules! fixed_len_struct {
    (
        $(#[$outer:meta])*
        struct $type:ident[$size:expr];
    ) => {
        $(#[$outer])*
        #[derive(Debug, Eq)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        pub struct $type<T: AsRef<[u8]>>(T);

        impl<T: AsRef<[u8]>> $type<T> {
            fn new_from_raw(bytes: T) -> $type<T> {
                $type(bytes)
            }

            pub fn new(data: T) -> Option<$type<T>> {
                let bytes = data.as_ref();
                if bytes.len() != $size {
                    None
                } else {
                    Some($type(data))
                }
            }

            #[inline]
            pub fn to_owned(&self) -> $type<[u8; $size]> {
                let mut data = [0u8; $size];
                data.copy_from_slice(self.0.as_ref());
                $type(data)
            }
        }

        impl<T: AsRef<[u8]> + Clone> Clone for $type<T> {
            fn clone(&self) -> Self {
                Self(self.0.clone())
            }
        }

        impl<T: AsRef<[u8]> + Copy> Copy for $type<T> {}

        impl<T: AsRef<[u8]>, V: AsRef<[u8]>> PartialEq<$type<T>> for $type<V> {
            fn eq(&self, other: &$type<T>) -> bool {
                self.as_ref() == other.as_ref()
            }
        }

        impl core::hash::Hash for $type<[u8; $size]> {
            fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
                self.0.hash(state);
            }
        }

        impl<'a> From<&'a [u8; $size]> for $type<&'a [u8; $size]> {
            fn from(v: &'a [u8; $size]) -> Self {
                $type(v)
            }
        }

        impl From<[u8; $size]> for $type<[u8; $size]> {
            fn from(v: [u8; $size]) -> Self {
                $type(v)
            }
        }

        impl<T: AsRef<[u8]>> AsRef<[u8]> for $type<T> {
            fn as_ref(&self) -> &[u8] {
                self.0.as_ref()
            }
        }

        impl<T: AsRef<[u8]> + Default> Default for $type<T> {
            #[inline]
            fn default() -> $type<T> {
                $type(T::default())
            }
        }
    };
}

fixed_len_struct! {
    /// EUI64 represents a 64-bit Extended Unique Identifier (DevEUI/JoinEUI), LSB first.
    struct EUI64[8];
}

fixed_len_struct! {
    /// DevNonce represents a 16-bit device nonce, used to prevent join-request replay.
    struct DevNonce[2];
}

impl From<DevNonce<[u8; 2]>> for u16 {
    fn from(v: DevNonce<[u8; 2]>) -> Self {
        u16::from_be_bytes(v.0)
    }
}

impl From<u16> for DevNonce<[u8; 2]> {
    fn from(v: u16) -> Self {
        Self::from(v.to_be_bytes())
    }
}

fixed_len_struct! {
    /// AppNonce represents a 24-bit network server nonce, carried in Join-Accept.
    struct AppNonce[3];
}

fixed_len_struct! {
    /// DevAddr represents a 32-bit device address, assigned at join time.
    struct DevAddr[4];
}

impl<T: AsRef<[u8]>> DevAddr<T> {
    /// The NwkID, the 7 most significant bits of the address, used to route uplinks
    /// between network servers.
    pub fn nwk_id(&self) -> u8 {
        self.0.as_ref()[0] >> 1
    }
}

use crate::crypto::Address;
use crate::serialization::{SerialError, SerialReader};

/// Upper bound on addresses in an address subscription.
pub const ADDRESSES_MAX_COUNT: usize = 1000;

/// What a peer wants to hear about. Nano clients subscribe to a handful of
/// addresses; full nodes subscribe to everything.
#[derive(Debug, PartialEq, Clone)]
pub enum Subscription {
    None,
    Any,
    Addresses(Vec<Address>),
    MinFee(u64),
}

impl Subscription {
    pub fn serialize_into(&self, vbytes: &mut Vec<u8>) {
        match self {
            Subscription::None => vbytes.push(0),
            Subscription::Any => vbytes.push(1),
            Subscription::Addresses(addresses) => {
                vbytes.push(2);
                vbytes.extend(&(addresses.len() as u16).to_be_bytes());
                for address in addresses {
                    vbytes.extend(address);
                }
            }
            Subscription::MinFee(min_fee) => {
                vbytes.push(3);
                vbytes.extend(&min_fee.to_be_bytes());
            }
        }
    }

    pub fn read_from(reader: &mut SerialReader<'_>) -> Result<Subscription, SerialError> {
        match reader.read_u8()? {
            0 => Ok(Subscription::None),
            1 => Ok(Subscription::Any),
            2 => {
                let count = reader.read_u16()? as usize;
                if count > ADDRESSES_MAX_COUNT {
                    return Err(SerialError::TooManyElements(
                        "subscription addresses",
                        count,
                        ADDRESSES_MAX_COUNT,
                    ));
                }
                let mut addresses = Vec::with_capacity(count);
                for _ in 0..count {
                    addresses.push(reader.read_array()?);
                }
                Ok(Subscription::Addresses(addresses))
            }
            3 => Ok(Subscription::MinFee(reader.read_u64()?)),
            _ => Err(SerialError::InvalidValue("subscription type")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(subscription: Subscription) {
        let mut vbytes = vec![];
        subscription.serialize_into(&mut vbytes);
        let mut reader = SerialReader::new(&vbytes);
        assert_eq!(Subscription::read_from(&mut reader).unwrap(), subscription);
        reader.finish().unwrap();
    }

    #[test]
    fn test_subscription_round_trip() {
        round_trip(Subscription::None);
        round_trip(Subscription::Any);
        round_trip(Subscription::Addresses(vec![[1; 20], [2; 20]]));
        round_trip(Subscription::MinFee(1_000));
    }

    #[test]
    fn test_subscription_unknown_tag() {
        let bytes = [9u8];
        let mut reader = SerialReader::new(&bytes);
        assert!(Subscription::read_from(&mut reader).is_err());
    }
}

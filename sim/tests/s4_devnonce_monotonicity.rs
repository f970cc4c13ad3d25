mod common;

use common::*;
use sim::Network;
use sim_gateway::LnsError;
use sim_region::RegionKind;

#[tokio::test]
async fn second_join_with_a_lower_devnonce_is_rejected() {
    let mut network = Network::new_virtual(vec![RegionKind::Eu868]);
    let key = nwkkey(b"@ABCDEFGHIJKLMNO");
    let dev_eui = [4u8; 8];

    network.medium.lock().unwrap().broadcast_complete(&jreq_msg(&key, dev_eui, 5));
    let first = network.gateway.next_up().await.unwrap().unwrap();
    network.lns.join(&first.msg, first.region, &default_join_params(key)).unwrap();

    network.medium.lock().unwrap().broadcast_complete(&jreq_msg(&key, dev_eui, 4));
    let second = network.gateway.next_up().await.unwrap().unwrap();
    let err = network.lns.join(&second.msg, second.region, &default_join_params(key)).unwrap_err();
    assert_eq!(err, LnsError::DevNonceNotIncreasing);

    // A strictly greater nonce still succeeds afterwards.
    network.medium.lock().unwrap().broadcast_complete(&jreq_msg(&key, dev_eui, 6));
    let third = network.gateway.next_up().await.unwrap().unwrap();
    assert!(network.lns.join(&third.msg, third.region, &default_join_params(key)).is_ok());
}

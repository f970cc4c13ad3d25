mod common;

use common::*;
use sim::Network;
use sim_region::RegionKind;
use sim_runtime::clock::TICKS_PER_SEC;

#[tokio::test]
async fn downlink_is_scheduled_and_delivered() {
    let mut network = Network::new_virtual(vec![RegionKind::Eu868]);
    let key = nwkkey(b"@ABCDEFGHIJKLMNO");
    let dev_eui = [2u8; 8];

    network.medium.lock().unwrap().broadcast_complete(&jreq_msg(&key, dev_eui, 1));
    let jreq = network.gateway.next_up().await.unwrap().unwrap();
    let accept = network.lns.join(&jreq.msg, jreq.region, &default_join_params(key)).unwrap();

    let dn_pdu = network.lns.dl(accept.dev_addr, false, false, Some(15), b"hi there", &[], 0, false).unwrap();
    let dn_msg = uplink_msg(sim::GATEWAY_TAG, TICKS_PER_SEC, &dn_pdu);
    network.gateway.sched_dn(dn_msg);

    // Draining 5s of virtual time must not raise any scheduler fault.
    network.advance_to(6 * TICKS_PER_SEC);
    assert!(network.scheduler.lock().unwrap().take_fault().is_none());
    assert_eq!(network.lns.sessions.by_addr(&accept.dev_addr).unwrap().fcnt_dn, 1);
}

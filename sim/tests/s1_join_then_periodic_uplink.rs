mod common;

use common::*;
use sim::Network;
use sim_region::RegionKind;
use sim_runtime::clock::TICKS_PER_SEC;

#[tokio::test]
async fn join_then_five_periodic_uplinks() {
    let mut network = Network::new_virtual(vec![RegionKind::Eu868]);
    let key = nwkkey(b"@ABCDEFGHIJKLMNO");
    let dev_eui = [1u8; 8];

    network.medium.lock().unwrap().broadcast_complete(&jreq_msg(&key, dev_eui, 1));
    let jreq = network.gateway.next_up().await.unwrap().unwrap();
    let accept = network.lns.join(&jreq.msg, jreq.region, &default_join_params(key)).unwrap();

    let mut arrival = 1_000u64;
    for fcnt in 0u16..5 {
        arrival += 7 * TICKS_PER_SEC; // within the 5..10s spacing the scenario calls for
        let pdu = pack_uplink(
            false,
            accept.dev_addr,
            fcnt,
            fcnt as u32,
            Some(15),
            b"hello",
            &network.lns.sessions.by_addr(&accept.dev_addr).unwrap().nwk_skey,
            &network.lns.sessions.by_addr(&accept.dev_addr).unwrap().app_skey,
        );
        network.medium.lock().unwrap().broadcast_complete(&uplink_msg(1, arrival, &pdu));

        let up = network.gateway.next_up().await.unwrap().unwrap();
        let frame = network.lns.verify_uplink(&up.msg.payload, accept.dev_addr).unwrap();
        assert_eq!(frame.fport, Some(15));
        assert_eq!(&frame.frm_payload[..], b"hello");
        assert_eq!(network.lns.sessions.by_addr(&accept.dev_addr).unwrap().fcnt_up, fcnt as u32);
    }
}

//! Custom Hickory DNS authority backed by the container registry.

use async_trait::async_trait;
use hickory_proto::op::ResponseCode;
use hickory_proto::rr::rdata::{A, AAAA, NS, SOA};
use hickory_proto::rr::{LowerName, Name, RData, Record, RecordSet, RecordType};
use hickory_server::authority::{
    Authority, LookupControlFlow, LookupError, LookupOptions, LookupRecords, MessageRequest,
    UpdateResult, ZoneType,
};
use hickory_server::server::RequestInfo;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::config::SoaConfig;
use crate::metrics::{self, QueryResult, Timer};
use crate::registry::ContainerRegistry;

/// Authority serving one zone out of the shared container registry.
///
/// Several instances share the same registry when multiple zones are
/// configured; the registry itself is zone-agnostic and matches on the full
/// query name.
pub struct DockerAuthority {
    origin: LowerName,
    registry: ContainerRegistry,
    ttl: u32,
    soa: SoaConfig,
}

impl DockerAuthority {
    /// Create a new authority for `zone` over the given registry.
    pub fn new(
        zone: &str,
        registry: ContainerRegistry,
        ttl: u32,
        soa: SoaConfig,
    ) -> Result<Self, hickory_proto::ProtoError> {
        // Config zones carry no trailing dot, but the catalog matches
        // query base names against FQDN origins only.
        let mut origin = Name::from_ascii(zone)?;
        origin.set_fqdn(true);

        Ok(Self {
            origin: origin.into(),
            registry,
            ttl,
            soa,
        })
    }

    /// Addresses for `qname` matching the requested record family. `None`
    /// means the name is absent from the registry altogether; an empty vec
    /// means the name exists but holds no record of this family.
    fn addresses(&self, qname: &str, rtype: RecordType) -> Option<Vec<IpAddr>> {
        let entry = self.registry.lookup_by_domain(qname)?;

        Some(match (rtype, entry.address) {
            (RecordType::A, addr @ IpAddr::V4(_)) => vec![addr],
            (RecordType::AAAA, addr @ IpAddr::V6(_)) => vec![addr],
            _ => Vec::new(),
        })
    }

    /// Build address records for the given name and IPs.
    fn build_address_records(&self, name: Name, rtype: RecordType, ips: &[IpAddr]) -> RecordSet {
        let mut record_set = RecordSet::new(name.clone(), rtype, 0);

        for ip in ips {
            let rdata = match ip {
                IpAddr::V4(v4) => RData::A(A::from(*v4)),
                IpAddr::V6(v6) => RData::AAAA(AAAA::from(*v6)),
            };
            let mut record = Record::from_rdata(name.clone(), self.ttl, rdata);
            record.set_dns_class(hickory_proto::rr::DNSClass::IN);
            record_set.insert(record, 0);
        }

        record_set
    }

    /// Build the SOA record for this zone. The serial tracks registry
    /// mutations so downstream caches can observe churn.
    fn build_soa_record(&self) -> RecordSet {
        let soa = SOA::new(
            Name::from_ascii(&self.soa.mname).unwrap_or_else(|_| Name::root()),
            Name::from_ascii(&self.soa.rname).unwrap_or_else(|_| Name::root()),
            self.registry.serial(),
            self.soa.refresh as i32,
            self.soa.retry as i32,
            self.soa.expire as i32,
            self.soa.minimum,
        );

        let name = Name::from(self.origin.clone());
        let mut record_set = RecordSet::new(name.clone(), RecordType::SOA, 0);
        let mut record = Record::from_rdata(name, self.ttl, RData::SOA(soa));
        record.set_dns_class(hickory_proto::rr::DNSClass::IN);
        record_set.insert(record, 0);

        record_set
    }

    /// Build an NS record for this zone.
    fn build_ns_record(&self) -> RecordSet {
        let name = Name::from(self.origin.clone());
        let ns_name = Name::from_ascii(&self.soa.mname).unwrap_or_else(|_| Name::root());

        let mut record_set = RecordSet::new(name.clone(), RecordType::NS, 0);
        let mut record = Record::from_rdata(name, self.ttl, RData::NS(NS(ns_name)));
        record.set_dns_class(hickory_proto::rr::DNSClass::IN);
        record_set.insert(record, 0);

        record_set
    }
}

#[async_trait]
impl Authority for DockerAuthority {
    type Lookup = LookupRecords;

    fn zone_type(&self) -> ZoneType {
        ZoneType::Primary
    }

    fn is_axfr_allowed(&self) -> bool {
        false
    }

    fn origin(&self) -> &LowerName {
        &self.origin
    }

    async fn lookup(
        &self,
        name: &LowerName,
        rtype: RecordType,
        lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        let timer = Timer::start();
        let rtype_str = format!("{:?}", rtype);

        // Until the initial population completes, answers would be
        // misleading negatives. REFUSED is the only retry-signalling code
        // the catalog forwards from an authority, so clients back off
        // instead of caching an empty answer.
        if !self.registry.is_ready() {
            debug!("registry not ready, refusing query");
            metrics::record_query(&rtype_str, QueryResult::NotReady, timer.elapsed());
            return LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::Refused)));
        }

        let qname = name.to_string();

        trace!(name = %qname, rtype = ?rtype, "DNS lookup");

        match rtype {
            RecordType::A | RecordType::AAAA => match self.addresses(&qname, rtype) {
                None => {
                    debug!(name = %qname, rtype = %rtype_str, "lookup: name not found");
                    metrics::record_query(&rtype_str, QueryResult::Miss, timer.elapsed());
                    LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::NXDomain)))
                }
                Some(ips) if ips.is_empty() => {
                    // The name exists with the other address family.
                    // NXDOMAIN would deny the whole name, so answer an
                    // empty NOERROR instead.
                    debug!(name = %qname, rtype = %rtype_str, "lookup: no records of this type");
                    metrics::record_query(&rtype_str, QueryResult::Miss, timer.elapsed());
                    LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::NoError)))
                }
                Some(ips) => {
                    debug!(name = %qname, rtype = %rtype_str, count = ips.len(), "lookup: returning records");
                    metrics::record_query(&rtype_str, QueryResult::Hit, timer.elapsed());
                    let dns_name = Name::from(name.clone());
                    let record_set = Arc::new(self.build_address_records(dns_name, rtype, &ips));
                    LookupControlFlow::Break(Ok(LookupRecords::new(lookup_options, record_set)))
                }
            },
            RecordType::SOA => {
                debug!(name = %qname, "SOA lookup");
                metrics::record_query(&rtype_str, QueryResult::Hit, timer.elapsed());
                let record_set = Arc::new(self.build_soa_record());
                LookupControlFlow::Break(Ok(LookupRecords::new(lookup_options, record_set)))
            }
            RecordType::NS => {
                debug!(name = %qname, "NS lookup");
                metrics::record_query(&rtype_str, QueryResult::Hit, timer.elapsed());
                let record_set = Arc::new(self.build_ns_record());
                LookupControlFlow::Break(Ok(LookupRecords::new(lookup_options, record_set)))
            }
            _ => {
                trace!(name = %qname, rtype = ?rtype, "unsupported record type");
                metrics::record_query(&rtype_str, QueryResult::Miss, timer.elapsed());
                LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::NoError)))
            }
        }
    }

    async fn search(
        &self,
        request_info: RequestInfo<'_>,
        lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        self.lookup(
            request_info.query.name(),
            request_info.query.query_type(),
            lookup_options,
        )
        .await
    }

    async fn get_nsec_records(
        &self,
        _name: &LowerName,
        _lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        // DNSSEC not supported
        LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::NoError)))
    }

    async fn update(&self, _update: &MessageRequest) -> UpdateResult<bool> {
        // Dynamic updates not supported
        Err(ResponseCode::NotImp)
    }
}

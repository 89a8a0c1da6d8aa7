//! `MessageLog` backed by librdkafka.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::consumer::{BaseConsumer, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::topic_partition_list::{Offset, TopicPartitionList};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::LogError;
use crate::record::{OffsetPolicy, Record};
use crate::source::{MessageLog, RecordStream};

impl From<OffsetPolicy> for Offset {
    fn from(policy: OffsetPolicy) -> Self {
        match policy {
            OffsetPolicy::Oldest => Offset::Beginning,
            OffsetPolicy::Newest => Offset::End,
        }
    }
}

/// A connection to a Kafka cluster. Each opened stream gets its own consumer.
pub struct KafkaLog {
    client_config: ClientConfig,
    metadata_client: BaseConsumer,
    brokers: String,
    metadata_timeout: Duration,
}

impl KafkaLog {
    /// Create the client and make sure at least one broker answers a metadata request.
    pub fn connect(config: &Config) -> Result<Self, LogError> {
        let brokers = config.bootstrap_servers();
        info!("connecting to Kafka brokers at {}...", brokers);

        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &brokers)
            .set("group.id", &config.group)
            .set("client.id", &config.group)
            .set(
                "session.timeout.ms",
                config.client.session_timeout_ms.to_string(),
            )
            // Offsets are never committed or stored; every run starts from its offset policy.
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("enable.partition.eof", "false");

        if config.client.kafka_tls {
            client_config.set("security.protocol", "ssl").set(
                "enable.ssl.certificate.verification",
                config.client.verify_ssl_certificate.to_string(),
            );
        };

        debug!("rdkafka configuration: {:?}", client_config);

        let connection_error = |source: KafkaError| LogError::Connection {
            brokers: brokers.clone(),
            source,
        };
        let metadata_client: BaseConsumer = client_config.create().map_err(connection_error)?;

        // Ping the cluster so an unreachable broker list fails before consumption starts
        metadata_client
            .fetch_metadata(None, Timeout::After(config.client.metadata_timeout()))
            .map_err(connection_error)?;
        info!("connected to Kafka brokers");

        Ok(Self {
            client_config,
            metadata_client,
            brokers,
            metadata_timeout: config.client.metadata_timeout(),
        })
    }

    fn connection_error(&self, source: KafkaError) -> LogError {
        LogError::Connection {
            brokers: self.brokers.clone(),
            source,
        }
    }
}

#[async_trait]
impl MessageLog for KafkaLog {
    async fn list_topics(&self) -> Result<Vec<String>, LogError> {
        let metadata = self
            .metadata_client
            .fetch_metadata(None, Timeout::After(self.metadata_timeout))
            .map_err(|e| self.connection_error(e))?;

        let mut topics: Vec<String> = metadata
            .topics()
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        topics.sort();
        Ok(topics)
    }

    async fn open_stream(
        &self,
        topic: &str,
        partition: i32,
        policy: OffsetPolicy,
    ) -> Result<Box<dyn RecordStream>, LogError> {
        let metadata = self
            .metadata_client
            .fetch_metadata(Some(topic), Timeout::After(self.metadata_timeout))
            .map_err(|e| self.connection_error(e))?;

        let found = metadata
            .topics()
            .iter()
            .find(|t| t.name() == topic && t.error().is_none())
            .ok_or_else(|| LogError::TopicNotFound {
                topic: topic.to_string(),
            })?;
        if !found.partitions().iter().any(|p| p.id() == partition) {
            return Err(LogError::PartitionNotFound {
                topic: topic.to_string(),
                partition,
            });
        }

        let consumer: StreamConsumer = self.client_config.create()?;
        let mut assignment = TopicPartitionList::new();
        assignment.add_partition_offset(topic, partition, policy.into())?;
        consumer.assign(&assignment)?;
        debug!(topic, partition, ?policy, "partition assigned");

        Ok(Box::new(KafkaStream {
            consumer,
            topic: topic.to_string(),
        }))
    }
}

struct KafkaStream {
    consumer: StreamConsumer,
    topic: String,
}

#[async_trait]
impl RecordStream for KafkaStream {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn recv(&mut self) -> Option<Result<Record, LogError>> {
        let result = match self.consumer.recv().await {
            Ok(message) => Ok(Record::from_message(&message)),
            Err(source) => Err(LogError::Receive {
                topic: self.topic.clone(),
                source,
            }),
        };
        Some(result)
    }

    async fn close(self: Box<Self>) -> Result<(), LogError> {
        self.consumer
            .unassign()
            .map_err(|source| LogError::Close {
                topic: self.topic.clone(),
                source,
            })?;
        debug!(topic = %self.topic, "stream closed");
        Ok(())
    }
}

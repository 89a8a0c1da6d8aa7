use rdkafka::error::KafkaError;
use thiserror::Error;

/// Errors raised by the message log collaborator.
#[derive(Error, Debug)]
pub enum LogError {
    #[error("cannot reach any broker at {brokers}")]
    Connection {
        brokers: String,
        #[source]
        source: KafkaError,
    },
    #[error("topic '{topic}' not found")]
    TopicNotFound { topic: String },
    #[error("topic '{topic}' has no partition {partition}")]
    PartitionNotFound { topic: String, partition: i32 },
    #[error("failed to receive from '{topic}'")]
    Receive {
        topic: String,
        #[source]
        source: KafkaError,
    },
    #[error("failed to close the stream for '{topic}'")]
    Close {
        topic: String,
        #[source]
        source: KafkaError,
    },
    #[error("kafka consumer error")]
    Consumer(#[from] KafkaError),
}

/// Errors found while validating the command line and environment.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid broker address '{0}'")]
    InvalidBroker(String),
    #[error("no brokers configured")]
    NoBrokers,
    #[error("invalid kafka client settings in environment")]
    Env(#[from] envconfig::Error),
}

/// Top level failure of a run, mapped onto the process exit status.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Log(#[from] LogError),
    #[error("a worker task failed")]
    Worker(#[from] tokio::task::JoinError),
}

impl AppError {
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) | AppError::Worker(_) => 1,
            AppError::Log(err) => match err {
                LogError::Connection { .. } | LogError::Consumer(_) | LogError::Receive { .. } => 2,
                LogError::TopicNotFound { .. } | LogError::PartitionNotFound { .. } => 3,
                LogError::Close { .. } => 4,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_separate_failure_classes() {
        let connection = AppError::from(LogError::Connection {
            brokers: "localhost:9092".to_string(),
            source: KafkaError::Canceled,
        });
        let missing = AppError::from(LogError::TopicNotFound {
            topic: "orders".to_string(),
        });
        let close = AppError::from(LogError::Close {
            topic: "orders".to_string(),
            source: KafkaError::Canceled,
        });
        let config = AppError::from(ConfigError::NoBrokers);

        assert_eq!(connection.exit_code(), 2);
        assert_eq!(missing.exit_code(), 3);
        assert_eq!(close.exit_code(), 4);
        assert_eq!(config.exit_code(), 1);
    }

    #[test]
    fn messages_name_the_topic() {
        let err = LogError::PartitionNotFound {
            topic: "orders".to_string(),
            partition: 3,
        };
        assert_eq!(err.to_string(), "topic 'orders' has no partition 3");
    }
}
